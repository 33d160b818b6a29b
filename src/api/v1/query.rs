use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
    RequestPartsExt,
};
use bson::{Bson, Document};

use crate::error::Error;

pub const DEFAULT_LIMIT: i64 = 100;

/// Query-string conventions translated into database directives:
/// `price[gte]=500`, `sort=-price,name`, `fields=name,price`,
/// `page=2&limit=10`.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub filter: Document,
    pub sort: Document,
    pub projection: Option<Document>,
    pub page: u64,
    pub limit: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];
const OPERATORS: [(&str, &str); 4] = [
    ("gte", "$gte"),
    ("gt", "$gt"),
    ("lte", "$lte"),
    ("lt", "$lt"),
];

impl ListParams {
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut filter = Document::new();

        for (key, value) in map {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }

            match parse_operator(key) {
                Some((field, op)) => {
                    let entry = filter
                        .entry(field.to_string())
                        .or_insert_with(|| Bson::Document(Document::new()));
                    if let Bson::Document(doc) = entry {
                        doc.insert(op, parse_value(value));
                    }
                }
                None => {
                    filter.insert(key.clone(), parse_value(value));
                }
            }
        }

        let sort = map
            .get("sort")
            .map(|it| parse_sort(it))
            .unwrap_or_else(|| bson::doc! { "created_at": -1 });

        let projection = map.get("fields").map(|it| parse_fields(it));

        let page = map
            .get("page")
            .and_then(|it| it.parse::<u64>().ok())
            .filter(|it| *it > 0)
            .unwrap_or(1);

        let limit = map
            .get("limit")
            .and_then(|it| it.parse::<i64>().ok())
            .filter(|it| *it > 0)
            .unwrap_or(DEFAULT_LIMIT);

        Self {
            filter,
            sort,
            projection,
            page,
            limit,
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit as u64
    }
}

/// `price[gte]` style keys carry the comparison operator in the field name.
fn parse_operator(key: &str) -> Option<(&str, &'static str)> {
    let (field, rest) = key.split_once('[')?;
    let op = rest.strip_suffix(']')?;

    OPERATORS
        .iter()
        .find(|(name, _)| *name == op)
        .map(|(_, mongo)| (field, *mongo))
}

/// Numeric-looking values are matched numerically, everything else as a
/// string. Booleans are recognized so flags like `secret_tour=false` work.
fn parse_value(value: &str) -> Bson {
    if let Ok(int) = value.parse::<i64>() {
        return Bson::Int64(int);
    }
    if let Ok(float) = value.parse::<f64>() {
        return Bson::Double(float);
    }
    match value {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        other => Bson::String(other.to_string()),
    }
}

/// Comma separated sort spec, descending on a leading minus.
fn parse_sort(spec: &str) -> Document {
    let mut sort = Document::new();

    for field in spec.split(',').filter(|it| !it.is_empty()) {
        match field.strip_prefix('-') {
            Some(field) => sort.insert(field, -1),
            None => sort.insert(field, 1),
        };
    }

    sort
}

fn parse_fields(spec: &str) -> Document {
    let mut projection = Document::new();

    for field in spec.split(',').filter(|it| !it.is_empty()) {
        projection.insert(field, 1);
    }

    projection
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ListParams
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(map) = parts
            .extract::<Query<HashMap<String, String>>>()
            .await
            .map_err(|_| Error::BadRequest("malformed query string"))?;

        Ok(Self::from_map(&map))
    }
}
