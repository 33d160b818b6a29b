use std::ops::{Deref, DerefMut};

use bson::{oid::ObjectId, Document};
use mongodb::options::FindOptions;
use serde::de::DeserializeOwned;

use crate::error::Error;

pub struct Collection<T>(pub mongodb::Collection<T>);

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Collection<T> {
    type Target = mongodb::Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Collection<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> From<mongodb::Collection<T>> for Collection<T> {
    fn from(value: mongodb::Collection<T>) -> Self {
        Self(value)
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned + Send + Sync + Unpin,
{
    /// Drains a find cursor into a vec.
    pub async fn find_all(
        &self,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<T>, Error> {
        let mut cursor = self.find(filter, options.into()).await?;

        let mut docs = vec![];

        while cursor.advance().await? {
            docs.push(cursor.deserialize_current()?);
        }

        Ok(docs)
    }

    pub async fn find_one_by_id(&self, id: ObjectId) -> Result<Option<T>, Error> {
        self.find_one(bson::doc! { "_id": id }, None)
            .await
            .map_err(Into::into)
    }

    /// Drains an aggregation cursor, deserializing each stage output
    /// document into `R`.
    pub async fn aggregate_all<R>(&self, pipeline: Vec<Document>) -> Result<Vec<R>, Error>
    where
        R: DeserializeOwned,
    {
        let mut cursor = self.aggregate(pipeline, None).await?;

        let mut docs = vec![];

        while cursor.advance().await? {
            docs.push(bson::from_document(cursor.deserialize_current()?)?);
        }

        Ok(docs)
    }
}
