use bson::{oid::ObjectId, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use serde::{de::DeserializeOwned, Serialize};

use crate::{error::Error, mongo_ext::Collection};

use super::query::ListParams;

/// A persisted document the generic CRUD operations can be instantiated
/// over. `scope()` is merged into every find-family filter, which is how
/// secret tours stay out of default listings.
pub trait Resource: Serialize + DeserializeOwned + Unpin + Send + Sync {
    /// Singular name used in not-found messages.
    const NAME: &'static str;

    fn scope() -> Document {
        Document::new()
    }
}

/// Query-string filter first, nested-route constraint and scope on top, so
/// neither can be overridden from the outside.
fn merged_filter<T: Resource>(extra: Document, params: &ListParams) -> Document {
    let mut filter = params.filter.clone();
    filter.extend(extra);
    filter.extend(T::scope());

    filter
}

/// List with filter/sort/projection/pagination from the query string plus
/// an extra filter for nested routes (e.g. bookings of one user).
pub async fn find_all<T: Resource>(
    collection: &Collection<T>,
    extra: Document,
    params: &ListParams,
) -> Result<Vec<T>, Error> {
    let filter = merged_filter::<T>(extra, params);

    let options = FindOptions::builder()
        .sort(params.sort.clone())
        .projection(params.projection.clone())
        .skip(params.skip())
        .limit(params.limit)
        .build();

    collection.find_all(filter, options).await
}

pub async fn find_by_id<T: Resource>(
    collection: &Collection<T>,
    id: ObjectId,
) -> Result<T, Error> {
    let mut filter = T::scope();
    filter.insert("_id", id);

    collection
        .find_one(filter, None)
        .await?
        .ok_or(Error::NotFound(T::NAME))
}

pub async fn insert_one<T: Resource>(collection: &Collection<T>, model: &T) -> Result<(), Error> {
    collection.insert_one(model, None).await?;

    Ok(())
}

/// `$set`s a whitelisted partial document and returns the post-image.
pub async fn update_by_id<T: Resource>(
    collection: &Collection<T>,
    id: ObjectId,
    set: Document,
) -> Result<T, Error> {
    let mut filter = T::scope();
    filter.insert("_id", id);

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    collection
        .find_one_and_update(filter, bson::doc! { "$set": set }, options)
        .await?
        .ok_or(Error::NotFound(T::NAME))
}

/// Hard delete; handlers answer 204 on success.
pub async fn delete_by_id<T: Resource>(
    collection: &Collection<T>,
    id: ObjectId,
) -> Result<(), Error> {
    let mut filter = T::scope();
    filter.insert("_id", id);

    let result = collection.delete_one(filter, None).await?;

    if result.deleted_count == 0 {
        return Err(Error::NotFound(T::NAME));
    }

    Ok(())
}
