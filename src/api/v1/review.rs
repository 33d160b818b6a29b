use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use bson::{oid::ObjectId, Document};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    mongo_ext::Collection,
    util::{FormattedDateTime, ObjectIdString, PathObjectId},
};

use super::{
    auth::{restrict_to, CurrentUser, UserRole},
    factory::{self, Resource},
    query::ListParams,
    tour::TourCollection,
};

#[derive(Clone)]
pub struct ReviewCollection(pub Collection<ReviewModel>);

impl std::ops::Deref for ReviewCollection {
    type Target = Collection<ReviewModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReviewModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub review: String,
    pub rating: f64,

    pub tour: ObjectId,
    pub user: ObjectId,

    pub created_at: bson::DateTime,
}

impl Resource for ReviewModel {
    const NAME: &'static str = "review";
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReviewResponse {
    pub id: ObjectIdString,

    pub review: String,
    pub rating: f64,

    pub tour: ObjectIdString,
    pub user: ObjectIdString,

    pub created_at: FormattedDateTime,
}

impl From<ReviewModel> for ReviewResponse {
    fn from(value: ReviewModel) -> Self {
        Self {
            id: value.id.into(),
            review: value.review,
            rating: value.rating,
            tour: value.tour.into(),
            user: value.user.into(),
            created_at: value.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReviewIndexResponse {
    pub results: usize,
    pub reviews: Vec<ReviewResponse>,
}

pub async fn index(
    _user: CurrentUser,
    State(reviews): State<ReviewCollection>,
    params: ListParams,
) -> Result<Json<ReviewIndexResponse>, Error> {
    let reviews = factory::find_all(&reviews, Document::new(), &params).await?;
    let reviews: Vec<ReviewResponse> = reviews.into_iter().map(Into::into).collect();

    Ok(Json(ReviewIndexResponse {
        results: reviews.len(),
        reviews,
    }))
}

/// Reviews of one tour, the nested `/tours/:id/reviews` route.
pub async fn index_for_tour(
    _user: CurrentUser,
    State(reviews): State<ReviewCollection>,
    PathObjectId(tour_id): PathObjectId,
    params: ListParams,
) -> Result<Json<ReviewIndexResponse>, Error> {
    let reviews = factory::find_all(&reviews, bson::doc! { "tour": tour_id }, &params).await?;
    let reviews: Vec<ReviewResponse> = reviews.into_iter().map(Into::into).collect();

    Ok(Json(ReviewIndexResponse {
        results: reviews.len(),
        reviews,
    }))
}

pub async fn show(
    _user: CurrentUser,
    State(reviews): State<ReviewCollection>,
    PathObjectId(review_id): PathObjectId,
) -> Result<Json<ReviewResponse>, Error> {
    let review = factory::find_by_id(&reviews, review_id).await?;

    Ok(Json(review.into()))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1))]
    pub review: String,

    #[validate(range(min = 1.0, max = 5.0))]
    pub rating: f64,
}

/// Only plain users review, and only once per tour. The author always comes
/// from the token, never from the body.
#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn create(
    user: CurrentUser,
    State(reviews): State<ReviewCollection>,
    State(tours): State<TourCollection>,
    PathObjectId(tour_id): PathObjectId,
    Json(request): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), Error> {
    restrict_to(&user, &[UserRole::User])?;

    request.validate()?;

    factory::find_by_id(&tours, tour_id).await?;

    let count = reviews
        .count_documents(bson::doc! { "tour": tour_id, "user": user.id }, None)
        .await?;

    if count > 0 {
        return Err(Error::MustUniqueError("review"));
    }

    let model = ReviewModel {
        id: ObjectId::new(),
        review: request.review,
        rating: request.rating,
        tour: tour_id,
        user: user.id,
        created_at: OffsetDateTime::now_utc().into(),
    };

    factory::insert_one(&reviews, &model).await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateReviewRequest {
    #[validate(length(min = 1))]
    pub review: Option<String>,

    #[validate(range(min = 1.0, max = 5.0))]
    pub rating: Option<f64>,
}

pub async fn update(
    user: CurrentUser,
    State(reviews): State<ReviewCollection>,
    PathObjectId(review_id): PathObjectId,
    Json(request): Json<UpdateReviewRequest>,
) -> Result<Json<ReviewResponse>, Error> {
    restrict_to(&user, &[UserRole::User])?;

    request.validate()?;

    let mut set = Document::new();
    if let Some(review) = &request.review {
        set.insert("review", review);
    }
    if let Some(rating) = request.rating {
        set.insert("rating", rating);
    }
    if set.is_empty() {
        return Err(Error::BadRequest("nothing to update"));
    }

    let review = factory::update_by_id(&reviews, review_id, set).await?;

    Ok(Json(review.into()))
}

pub async fn delete(
    user: CurrentUser,
    State(reviews): State<ReviewCollection>,
    PathObjectId(review_id): PathObjectId,
) -> Result<StatusCode, Error> {
    restrict_to(&user, &[UserRole::User])?;

    factory::delete_by_id(&reviews, review_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
