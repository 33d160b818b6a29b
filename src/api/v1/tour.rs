use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bson::{oid::ObjectId, Document};
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::{Date, Month, OffsetDateTime};
use validator::Validate;

use crate::{
    error::Error,
    media,
    mongo_ext::Collection,
    util::{slugify, FormattedDateTime, ObjectIdString, PathObjectId},
};

use super::{
    auth::{restrict_to, CurrentUser, UserCollection, UserResponse, UserRole},
    factory::{self, Resource},
    query::ListParams,
    review::{ReviewCollection, ReviewResponse},
};

#[derive(Clone)]
pub struct TourCollection(pub Collection<TourModel>);

impl std::ops::Deref for TourCollection {
    type Target = Collection<TourModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeoPointType {
    #[default]
    Point,
}

/// GeoJSON point with the original's address/description annotations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeoPoint {
    #[serde(rename = "type", default)]
    pub point_type: GeoPointType,
    pub coordinates: Vec<f64>,
    pub address: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TourModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub name: String,
    pub slug: String,

    pub duration: i64,
    pub max_group_size: i64,
    pub difficulty: Difficulty,

    #[serde(default = "default_ratings_average")]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: i64,

    pub price: f64,
    pub price_discount: Option<f64>,

    pub summary: String,
    pub description: Option<String>,

    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub start_dates: Vec<bson::DateTime>,

    #[serde(default)]
    pub secret_tour: bool,

    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub locations: Vec<GeoPoint>,

    #[serde(default)]
    pub guides: Vec<ObjectId>,

    pub created_at: bson::DateTime,
}

fn default_ratings_average() -> f64 {
    4.5
}

impl Resource for TourModel {
    const NAME: &'static str = "tour";

    // secret tours never show up in default find-family queries
    fn scope() -> Document {
        bson::doc! { "secret_tour": { "$ne": true } }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TourResponse {
    pub id: ObjectIdString,

    pub name: String,
    pub slug: String,

    pub duration: i64,
    pub duration_weeks: f64,
    pub max_group_size: i64,
    pub difficulty: Difficulty,

    pub ratings_average: f64,
    pub ratings_quantity: i64,

    pub price: f64,
    pub price_discount: Option<f64>,

    pub summary: String,
    pub description: Option<String>,

    pub image_cover: String,
    pub images: Vec<String>,

    pub start_dates: Vec<FormattedDateTime>,

    pub secret_tour: bool,

    pub start_location: Option<GeoPoint>,
    pub locations: Vec<GeoPoint>,

    pub guides: Vec<ObjectIdString>,

    pub created_at: FormattedDateTime,
}

impl From<TourModel> for TourResponse {
    fn from(tour: TourModel) -> Self {
        Self {
            id: tour.id.into(),
            name: tour.name,
            slug: tour.slug,

            duration: tour.duration,
            duration_weeks: tour.duration as f64 / 7.0,
            max_group_size: tour.max_group_size,
            difficulty: tour.difficulty,

            ratings_average: tour.ratings_average,
            ratings_quantity: tour.ratings_quantity,

            price: tour.price,
            price_discount: tour.price_discount,

            summary: tour.summary,
            description: tour.description,

            image_cover: tour.image_cover,
            images: tour.images,

            start_dates: tour.start_dates.into_iter().map(Into::into).collect(),

            secret_tour: tour.secret_tour,

            start_location: tour.start_location,
            locations: tour.locations,

            guides: tour.guides.into_iter().map(Into::into).collect(),

            created_at: tour.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TourIndexResponse {
    pub results: usize,
    pub tours: Vec<TourResponse>,
}

pub async fn index(
    State(tours): State<TourCollection>,
    params: ListParams,
) -> Result<Json<TourIndexResponse>, Error> {
    let tours = factory::find_all(&tours, Document::new(), &params).await?;

    let tours: Vec<TourResponse> = tours.into_iter().map(Into::into).collect();

    Ok(Json(TourIndexResponse {
        results: tours.len(),
        tours,
    }))
}

/// Get-by-id eager-loads the guides and the reviews back-reference.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TourDetailResponse {
    pub tour: TourResponse,
    pub guides: Vec<UserResponse>,
    pub reviews: Vec<ReviewResponse>,
}

pub async fn show(
    State(tours): State<TourCollection>,
    State(users): State<UserCollection>,
    State(reviews): State<ReviewCollection>,
    PathObjectId(tour_id): PathObjectId,
) -> Result<Json<TourDetailResponse>, Error> {
    let tour = factory::find_by_id(&tours, tour_id).await?;

    let guides = users
        .find_all(bson::doc! { "_id": { "$in": &tour.guides } }, None)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let reviews = reviews
        .find_all(bson::doc! { "tour": tour_id }, None)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(TourDetailResponse {
        tour: tour.into(),
        guides,
        reviews,
    }))
}

pub async fn show_by_slug(
    State(tours): State<TourCollection>,
    Path(slug): Path<String>,
) -> Result<Json<TourResponse>, Error> {
    let mut filter = TourModel::scope();
    filter.insert("slug", slug);

    let tour = tours
        .find_one(filter, None)
        .await?
        .ok_or(Error::NotFound("tour"))?;

    Ok(Json(tour.into()))
}

fn validate_price_discount(request: &CreateTourRequest) -> Result<(), validator::ValidationError> {
    match request.price_discount {
        Some(discount) if discount >= request.price => {
            Err(validator::ValidationError::new(
                "discount price should be less than price",
            ))
        }
        _ => Ok(()),
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[validate(schema(function = "validate_price_discount"))]
pub struct CreateTourRequest {
    #[validate(length(min = 10, max = 30))]
    pub name: String,

    #[validate(range(min = 1))]
    pub duration: i64,

    #[validate(range(min = 1))]
    pub max_group_size: i64,

    pub difficulty: Difficulty,

    #[validate(range(min = 0.0))]
    pub price: f64,

    pub price_discount: Option<f64>,

    #[validate(length(min = 1))]
    pub summary: String,

    pub description: Option<String>,

    pub image_cover: String,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub start_dates: Vec<FormattedDateTime>,

    #[serde(default)]
    pub secret_tour: bool,

    pub start_location: Option<GeoPoint>,

    #[serde(default)]
    pub locations: Vec<GeoPoint>,

    #[serde(default)]
    pub guides: Vec<ObjectIdString>,
}

fn model_from_request(request: CreateTourRequest) -> TourModel {
    let slug = slugify(&request.name);

    TourModel {
        id: ObjectId::new(),
        name: request.name,
        slug,

        duration: request.duration,
        max_group_size: request.max_group_size,
        difficulty: request.difficulty,

        ratings_average: default_ratings_average(),
        ratings_quantity: 0,

        price: request.price,
        price_discount: request.price_discount,

        summary: request.summary,
        description: request.description,

        image_cover: request.image_cover,
        images: request.images,

        start_dates: request.start_dates.into_iter().map(Into::into).collect(),

        secret_tour: request.secret_tour,

        start_location: request.start_location,
        locations: request.locations,

        guides: request.guides.into_iter().map(Into::into).collect(),

        created_at: OffsetDateTime::now_utc().into(),
    }
}

#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn create(
    State(tours): State<TourCollection>,
    user: CurrentUser,
    Json(request): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<TourResponse>), Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    request.validate()?;

    let count = tours
        .count_documents(bson::doc! { "name": &request.name }, None)
        .await?;

    if count > 0 {
        return Err(Error::MustUniqueError("name"));
    }

    let model = model_from_request(request);

    tracing::debug!("creating tour {}", model.slug);
    factory::insert_one(&tours, &model).await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateTourRequest {
    #[validate(length(min = 10, max = 30))]
    pub name: Option<String>,

    #[validate(range(min = 1))]
    pub duration: Option<i64>,

    #[validate(range(min = 1))]
    pub max_group_size: Option<i64>,

    pub difficulty: Option<Difficulty>,

    #[validate(range(min = 0.0))]
    pub price: Option<f64>,

    pub price_discount: Option<f64>,

    #[validate(length(min = 1))]
    pub summary: Option<String>,

    pub description: Option<String>,

    pub image_cover: Option<String>,

    pub images: Option<Vec<String>>,

    pub start_dates: Option<Vec<FormattedDateTime>>,

    pub secret_tour: Option<bool>,

    pub start_location: Option<GeoPoint>,

    pub locations: Option<Vec<GeoPoint>>,

    pub guides: Option<Vec<ObjectIdString>>,
}

/// Whitelisted `$set` document; the slug follows the name.
fn update_document(request: &UpdateTourRequest) -> Result<Document, Error> {
    let mut set = Document::new();

    if let Some(name) = &request.name {
        set.insert("name", name);
        set.insert("slug", slugify(name));
    }
    if let Some(duration) = request.duration {
        set.insert("duration", duration);
    }
    if let Some(max_group_size) = request.max_group_size {
        set.insert("max_group_size", max_group_size);
    }
    if let Some(difficulty) = request.difficulty {
        set.insert("difficulty", bson::to_bson(&difficulty)?);
    }
    if let Some(price) = request.price {
        set.insert("price", price);
    }
    if let Some(price_discount) = request.price_discount {
        set.insert("price_discount", price_discount);
    }
    if let Some(summary) = &request.summary {
        set.insert("summary", summary);
    }
    if let Some(description) = &request.description {
        set.insert("description", description);
    }
    if let Some(image_cover) = &request.image_cover {
        set.insert("image_cover", image_cover);
    }
    if let Some(images) = &request.images {
        set.insert("images", images);
    }
    if let Some(start_dates) = &request.start_dates {
        let dates: Vec<bson::DateTime> = start_dates.iter().map(|it| (*it).into()).collect();
        set.insert("start_dates", bson::to_bson(&dates)?);
    }
    if let Some(secret_tour) = request.secret_tour {
        set.insert("secret_tour", secret_tour);
    }
    if let Some(start_location) = &request.start_location {
        set.insert("start_location", bson::to_bson(start_location)?);
    }
    if let Some(locations) = &request.locations {
        set.insert("locations", bson::to_bson(locations)?);
    }
    if let Some(guides) = &request.guides {
        let guides: Vec<ObjectId> = guides.iter().map(|it| it.0).collect();
        set.insert("guides", guides);
    }

    Ok(set)
}

#[tracing::instrument(skip_all, fields(id = %tour_id, user = %user.id))]
pub async fn update(
    user: CurrentUser,
    State(tours): State<TourCollection>,
    PathObjectId(tour_id): PathObjectId,
    Json(request): Json<UpdateTourRequest>,
) -> Result<Json<TourResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    request.validate()?;

    let current = factory::find_by_id(&tours, tour_id).await?;

    // the discount invariant holds against the post-update document
    let price = request.price.unwrap_or(current.price);
    let discount = request.price_discount.or(current.price_discount);
    if matches!(discount, Some(discount) if discount >= price) {
        return Err(Error::BadRequest("discount price should be less than price"))
            .tap_err(|_| tracing::debug!("tried raising discount above price"));
    }

    if let Some(name) = &request.name {
        if name != &current.name {
            let count = tours
                .count_documents(bson::doc! { "name": name }, None)
                .await?;

            if count > 0 {
                return Err(Error::MustUniqueError("name"));
            }
        }
    }

    let set = update_document(&request)?;
    let tour = factory::update_by_id(&tours, tour_id, set).await?;

    Ok(Json(tour.into()))
}

#[tracing::instrument(skip_all, fields(id = %tour_id, user = %user.id))]
pub async fn delete(
    State(tours): State<TourCollection>,
    user: CurrentUser,
    PathObjectId(tour_id): PathObjectId,
) -> Result<StatusCode, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    factory::delete_by_id(&tours, tour_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub const MAX_TOUR_IMAGES: usize = 3;

/// Multipart `image_cover` (single) and `images` (up to three) fields,
/// resized to 2000x1333 JPEGs under `public/img/tours/`.
#[tracing::instrument(skip_all, fields(id = %tour_id, user = %user.id))]
pub async fn upload_images(
    user: CurrentUser,
    State(tours): State<TourCollection>,
    PathObjectId(tour_id): PathObjectId,
    mut multipart: Multipart,
) -> Result<Json<TourResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    // 404 before touching the filesystem
    factory::find_by_id(&tours, tour_id).await?;

    let timestamp = OffsetDateTime::now_utc().unix_timestamp();

    let mut image_cover = None;
    let mut images = vec![];

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if !media::is_image(field.content_type()) {
            return Err(Error::BadRequest("please upload images only"));
        }

        let data = field.bytes().await?;

        match name.as_str() {
            "image_cover" => {
                let filename = format!("tour-{}-{}-cover.jpeg", tour_id, timestamp);
                media::resize_to_jpeg(&data, 2000, 1333, format!("public/img/tours/{}", filename))?;
                image_cover = Some(filename);
            }
            "images" if images.len() < MAX_TOUR_IMAGES => {
                let filename = format!("tour-{}-{}-{}.jpeg", tour_id, timestamp, images.len() + 1);
                media::resize_to_jpeg(&data, 2000, 1333, format!("public/img/tours/{}", filename))?;
                images.push(filename);
            }
            "images" => {
                return Err(Error::BadRequest("a tour carries at most three images"));
            }
            _ => {
                return Err(Error::BadRequest(
                    "unknown field, expected image_cover or images",
                ));
            }
        }
    }

    let mut set = Document::new();
    if let Some(image_cover) = image_cover {
        set.insert("image_cover", image_cover);
    }
    if !images.is_empty() {
        set.insert("images", images);
    }
    if set.is_empty() {
        return Err(Error::BadRequest("no images supplied"));
    }

    let tour = factory::update_by_id(&tours, tour_id, set).await?;

    Ok(Json(tour.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TourStats {
    #[serde(rename = "_id")]
    pub difficulty: String,
    pub num_tours: i64,
    pub average_rating: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub total_price: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TourStatsResponse {
    pub stats: Vec<TourStats>,
}

pub async fn tour_stats(
    user: CurrentUser,
    State(tours): State<TourCollection>,
) -> Result<Json<TourStatsResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    let stats = tours
        .aggregate_all(vec![
            bson::doc! { "$match": { "ratings_average": { "$gte": 4.5 } } },
            bson::doc! { "$group": {
                "_id": { "$toUpper": "$difficulty" },
                "num_tours": { "$sum": 1 },
                "average_rating": { "$avg": "$ratings_average" },
                "min_price": { "$min": "$price" },
                "max_price": { "$max": "$price" },
                "total_price": { "$sum": "$price" },
            }},
            bson::doc! { "$sort": { "num_tours": 1 } },
        ])
        .await?;

    Ok(Json(TourStatsResponse { stats }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MonthlyPlan {
    pub month: i32,
    pub num_tours: i64,
    pub tours: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MonthlyPlanResponse {
    pub results: usize,
    pub plan: Vec<MonthlyPlan>,
}

pub async fn monthly_plan(
    State(tours): State<TourCollection>,
    Path(year): Path<i32>,
) -> Result<Json<MonthlyPlanResponse>, Error> {
    let from = Date::from_calendar_date(year, Month::January, 1)
        .map_err(|_| Error::BadRequest("invalid year"))?
        .midnight()
        .assume_utc();
    let to = Date::from_calendar_date(year, Month::December, 31)
        .map_err(|_| Error::BadRequest("invalid year"))?
        .midnight()
        .assume_utc();

    let plan: Vec<MonthlyPlan> = tours
        .aggregate_all(vec![
            bson::doc! { "$unwind": "$start_dates" },
            bson::doc! { "$match": { "start_dates": {
                "$gte": bson::DateTime::from(from),
                "$lte": bson::DateTime::from(to),
            }}},
            bson::doc! { "$group": {
                "_id": { "$month": "$start_dates" },
                "num_tours": { "$sum": 1 },
                "tours": { "$push": "$name" },
            }},
            bson::doc! { "$addFields": { "month": "$_id" } },
            bson::doc! { "$sort": { "month": 1 } },
            bson::doc! { "$project": { "_id": 0 } },
        ])
        .await?;

    Ok(Json(MonthlyPlanResponse {
        results: plan.len(),
        plan,
    }))
}

/// `"lat,lng"` path segment.
fn parse_latlng(latlng: &str) -> Result<(f64, f64), Error> {
    let (lat, lng) = latlng
        .split_once(',')
        .ok_or(Error::BadRequest("no coordinates defined"))?;

    let lat = lat.trim().parse().map_err(|_| Error::BadRequest("no coordinates defined"))?;
    let lng = lng.trim().parse().map_err(|_| Error::BadRequest("no coordinates defined"))?;

    Ok((lat, lng))
}

const EARTH_RADIUS_KM: f64 = 6371.0;

pub async fn tours_within(
    State(tours): State<TourCollection>,
    Path((distance, latlng)): Path<(f64, String)>,
) -> Result<Json<TourIndexResponse>, Error> {
    let (lat, lng) = parse_latlng(&latlng)?;

    let radius = distance / EARTH_RADIUS_KM;

    let mut filter = TourModel::scope();
    filter.insert(
        "start_location",
        bson::doc! { "$geoWithin": { "$centerSphere": [[lng, lat], radius] } },
    );

    let tours = tours.find_all(filter, None).await?;
    let tours: Vec<TourResponse> = tours.into_iter().map(Into::into).collect();

    Ok(Json(TourIndexResponse {
        results: tours.len(),
        tours,
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TourDistance {
    #[serde(rename = "_id")]
    pub id: ObjectIdString,
    pub name: String,
    pub distance_km: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TourDistancesResponse {
    pub distances: Vec<TourDistance>,
}

pub async fn distances(
    State(tours): State<TourCollection>,
    Path(latlng): Path<String>,
) -> Result<Json<TourDistancesResponse>, Error> {
    let (lat, lng) = parse_latlng(&latlng)?;

    let distances = tours
        .aggregate_all(vec![
            bson::doc! { "$geoNear": {
                "near": { "type": "Point", "coordinates": [lng, lat] },
                "distanceField": "distance_km",
                "distanceMultiplier": 0.001,
            }},
            // _id as hex so the row deserializes straight into the response
            bson::doc! { "$project": {
                "_id": { "$toString": "$_id" },
                "name": 1,
                "distance_km": 1,
            }},
            bson::doc! { "$sort": { "distance_km": 1 } },
        ])
        .await?;

    Ok(Json(TourDistancesResponse { distances }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{extract::Path, Json};
    use validator::Validate;

    use crate::{api::v1::tests::bootstrap, error::Error};

    use super::{CreateTourRequest, Difficulty, TourModel, TourResponse};

    fn create_request() -> CreateTourRequest {
        CreateTourRequest {
            name: "The Forest Hiker".to_string(),
            duration: 5,
            max_group_size: 25,
            difficulty: Difficulty::Easy,
            price: 397.0,
            price_discount: None,
            summary: "Breathtaking hike through the Canadian Banff".to_string(),
            description: None,
            image_cover: "tour-1-cover.jpg".to_string(),
            images: vec![],
            start_dates: vec![],
            secret_tour: false,
            start_location: None,
            locations: vec![],
            guides: vec![],
        }
    }

    #[test]
    fn discount_must_be_less_than_price() {
        let mut request = create_request();

        request.price_discount = Some(396.9);
        request.validate().unwrap();

        request.price_discount = Some(397.0);
        request.validate().unwrap_err();

        request.price_discount = Some(500.0);
        request.validate().unwrap_err();

        request.price_discount = None;
        request.validate().unwrap();
    }

    #[test]
    fn name_length_is_bounded() {
        let mut request = create_request();

        request.name = "Too short".to_string();
        request.validate().unwrap_err();

        request.name = "A name that is far too long for any tour".to_string();
        request.validate().unwrap_err();
    }

    #[test]
    fn slug_and_defaults_are_derived() {
        let model = super::model_from_request(create_request());

        assert_eq!(model.slug, "the-forest-hiker");
        assert_eq!(model.ratings_average, 4.5);
        assert_eq!(model.ratings_quantity, 0);
        assert!(!model.secret_tour);
    }

    #[test]
    fn duration_weeks_is_derived() {
        let model = super::model_from_request(create_request());
        let response = TourResponse::from(model);

        assert_eq!(response.duration_weeks, 5.0 / 7.0);
    }

    #[test]
    fn difficulty_wire_names() {
        assert_eq!(
            serde_json::to_string(&Difficulty::Difficult).unwrap(),
            "\"difficult\""
        );
        assert_eq!(
            serde_json::from_str::<Difficulty>("\"medium\"").unwrap(),
            Difficulty::Medium
        );
        serde_json::from_str::<Difficulty>("\"hard\"").unwrap_err();
    }

    #[test]
    fn latlng_parsing() {
        assert_eq!(super::parse_latlng("34.1,-118.1").unwrap(), (34.1, -118.1));
        assert_eq!(
            super::parse_latlng(" 34.1 , -118.1 ").unwrap(),
            (34.1, -118.1)
        );

        assert_matches!(
            super::parse_latlng("34.1").unwrap_err(),
            Error::BadRequest(..)
        );
        assert_matches!(
            super::parse_latlng("a,b").unwrap_err(),
            Error::BadRequest(..)
        );
    }

    #[test]
    fn update_document_whitelists_and_follows_the_slug() {
        let request = super::UpdateTourRequest {
            name: Some("The Sea Explorer Tour".to_string()),
            price: Some(499.0),
            ..Default::default()
        };

        let set = super::update_document(&request).unwrap();

        assert_eq!(set.get_str("name").unwrap(), "The Sea Explorer Tour");
        assert_eq!(set.get_str("slug").unwrap(), "the-sea-explorer-tour");
        assert_eq!(set.get_f64("price").unwrap(), 499.0);
        assert!(!set.contains_key("ratings_average"));
        assert!(!set.contains_key("created_at"));
    }

    #[test]
    fn secret_tours_are_outside_the_default_scope() {
        use super::super::factory::Resource;

        assert_eq!(
            TourModel::scope(),
            bson::doc! { "secret_tour": { "$ne": true } }
        );
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_secret_tour_is_hidden_from_listing() {
        let bootstrap = bootstrap().await;

        let mut secret = create_request();
        secret.name = "A Very Secret Tour".to_string();
        secret.secret_tour = true;

        let _ = super::create(
            bootstrap.tour_collection(),
            bootstrap.current_user(),
            Json(secret),
        )
        .await
        .unwrap();

        let (_, Json(visible)) = super::create(
            bootstrap.tour_collection(),
            bootstrap.current_user(),
            Json(create_request()),
        )
        .await
        .unwrap();

        let Json(index) = super::index(bootstrap.tour_collection(), Default::default())
            .await
            .unwrap();

        assert_eq!(index.results, 1);
        assert_eq!(index.tours[0].id, visible.id);

        // nor from the slug lookup
        let err = super::show_by_slug(
            bootstrap.tour_collection(),
            Path("a-very-secret-tour".to_string()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::NotFound("tour"));
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_non_admin_cannot_create() {
        let bootstrap = bootstrap()
            .await
            .derive("guide@test.com", "password123", super::UserRole::Guide)
            .await;

        let err = super::create(
            bootstrap.tour_collection(),
            bootstrap.current_user(),
            Json(create_request()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_missing_tour_is_404() {
        let bootstrap = bootstrap().await;

        let err = super::show(
            bootstrap.tour_collection(),
            bootstrap.user_collection(),
            bootstrap.review_collection(),
            crate::util::PathObjectId(bson::oid::ObjectId::new()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::NotFound("tour"));
    }
}
