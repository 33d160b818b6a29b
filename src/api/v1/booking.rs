use axum::{
    extract::{Query, State},
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
    razorpay::{PaymentOrder, RazorpayState},
    util::{FormattedDateTime, ObjectIdString, PathObjectId},
};

use super::{
    auth::{restrict_to, CurrentUser, UserResponse, UserRole},
    factory::{self, Resource},
    query::ListParams,
    tour::{TourCollection, TourModel},
};

#[derive(Clone)]
pub struct BookingCollection(pub Collection<BookingModel>);

impl std::ops::Deref for BookingCollection {
    type Target = Collection<BookingModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookingModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub payment_id: Option<String>,
    pub order_id: Option<String>,

    pub tour: ObjectId,
    pub user: ObjectId,

    pub price: f64,

    #[serde(default = "default_paid")]
    pub paid: bool,

    pub created_at: bson::DateTime,
}

fn default_paid() -> bool {
    true
}

impl Resource for BookingModel {
    const NAME: &'static str = "booking";
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BookingResponse {
    pub id: ObjectIdString,

    pub payment_id: Option<String>,
    pub order_id: Option<String>,

    pub tour: ObjectIdString,
    pub user: ObjectIdString,

    pub price: f64,
    pub paid: bool,

    pub created_at: FormattedDateTime,
}

impl From<BookingModel> for BookingResponse {
    fn from(value: BookingModel) -> Self {
        Self {
            id: value.id.into(),
            payment_id: value.payment_id,
            order_id: value.order_id,
            tour: value.tour.into(),
            user: value.user.into(),
            price: value.price,
            paid: value.paid,
            created_at: value.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeyResponse {
    pub key: String,
}

/// Publishable key for the checkout widget, never the secret.
pub async fn get_key(
    _user: CurrentUser,
    State(razorpay): State<RazorpayState>,
) -> Json<KeyResponse> {
    Json(KeyResponse {
        key: razorpay.key_id().to_string(),
    })
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckoutRequest {
    pub slug: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckoutResponse {
    pub order: PaymentOrder,
    pub user: UserResponse,
}

/// Opens a payment order over the tour price. Rupees become paise on the
/// wire.
#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn checkout(
    user: CurrentUser,
    State(tours): State<TourCollection>,
    State(razorpay): State<RazorpayState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, Error> {
    let mut filter = TourModel::scope();
    filter.insert("slug", &request.slug);

    let tour = tours
        .find_one(filter, None)
        .await?
        .ok_or(Error::NotFound("tour"))?;

    let amount = (tour.price * 100.0).round() as i64;
    let order = razorpay.create_order(amount, "INR").await?;

    tracing::debug!("order {} opened for tour {}", order.id, tour.slug);

    Ok(Json(CheckoutResponse {
        order,
        user: user.0.into(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CallbackParams {
    pub tour: ObjectIdString,
    pub user: ObjectIdString,
    pub price: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CallbackBody {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Provider-redirect endpoint, authenticated by the payment signature
/// rather than a user token. Nothing is persisted on a mismatch.
#[tracing::instrument(skip_all, fields(order = %body.razorpay_order_id))]
pub async fn callback(
    State(razorpay): State<RazorpayState>,
    State(bookings): State<BookingCollection>,
    Query(params): Query<CallbackParams>,
    Json(body): Json<CallbackBody>,
) -> Result<(StatusCode, Json<BookingResponse>), Error> {
    let verified = razorpay.verify_signature(
        &body.razorpay_order_id,
        &body.razorpay_payment_id,
        &body.razorpay_signature,
    );

    if !verified {
        tracing::warn!("rejected a payment callback with a bad signature");
        return Err(Error::PaymentSignatureMismatch);
    }

    let model = BookingModel {
        id: ObjectId::new(),
        payment_id: Some(body.razorpay_payment_id),
        order_id: Some(body.razorpay_order_id),
        tour: params.tour.into(),
        user: params.user.into(),
        price: params.price as f64 / 100.0,
        paid: true,
        created_at: OffsetDateTime::now_utc().into(),
    };

    factory::insert_one(&bookings, &model).await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BookingIndexResponse {
    pub results: usize,
    pub bookings: Vec<BookingResponse>,
}

pub async fn index(
    user: CurrentUser,
    State(bookings): State<BookingCollection>,
    params: ListParams,
) -> Result<Json<BookingIndexResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin, UserRole::LeadGuide])?;

    let bookings = factory::find_all(&bookings, Document::new(), &params).await?;
    let bookings: Vec<BookingResponse> = bookings.into_iter().map(Into::into).collect();

    Ok(Json(BookingIndexResponse {
        results: bookings.len(),
        bookings,
    }))
}

/// `/bookings/user/:id`; admins see anyone, everyone sees themselves.
pub async fn index_for_user(
    user: CurrentUser,
    State(bookings): State<BookingCollection>,
    PathObjectId(user_id): PathObjectId,
    params: ListParams,
) -> Result<Json<BookingIndexResponse>, Error> {
    if user.id != user_id {
        restrict_to(&user, &[UserRole::Admin, UserRole::LeadGuide])?;
    }

    let bookings = factory::find_all(&bookings, bson::doc! { "user": user_id }, &params).await?;
    let bookings: Vec<BookingResponse> = bookings.into_iter().map(Into::into).collect();

    Ok(Json(BookingIndexResponse {
        results: bookings.len(),
        bookings,
    }))
}

pub async fn show(
    user: CurrentUser,
    State(bookings): State<BookingCollection>,
    PathObjectId(booking_id): PathObjectId,
) -> Result<Json<BookingResponse>, Error> {
    let booking = factory::find_by_id(&bookings, booking_id).await?;

    if user.id != booking.user {
        restrict_to(&user, &[UserRole::Admin, UserRole::LeadGuide])?;
    }

    Ok(Json(booking.into()))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateBookingRequest {
    pub tour: ObjectIdString,
    pub user: ObjectIdString,

    #[validate(range(min = 0.0))]
    pub price: f64,

    #[serde(default = "default_paid")]
    pub paid: bool,
}

/// Manual booking entry, e.g. for payments taken outside the gateway.
#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn create(
    user: CurrentUser,
    State(bookings): State<BookingCollection>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    request.validate()?;

    let model = BookingModel {
        id: ObjectId::new(),
        payment_id: None,
        order_id: None,
        tour: request.tour.into(),
        user: request.user.into(),
        price: request.price,
        paid: request.paid,
        created_at: OffsetDateTime::now_utc().into(),
    };

    factory::insert_one(&bookings, &model).await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateBookingRequest {
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,

    pub paid: Option<bool>,
}

pub async fn update(
    user: CurrentUser,
    State(bookings): State<BookingCollection>,
    PathObjectId(booking_id): PathObjectId,
    Json(request): Json<UpdateBookingRequest>,
) -> Result<Json<BookingResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    request.validate()?;

    let mut set = Document::new();
    if let Some(price) = request.price {
        set.insert("price", price);
    }
    if let Some(paid) = request.paid {
        set.insert("paid", paid);
    }
    if set.is_empty() {
        return Err(Error::BadRequest("nothing to update"));
    }

    let booking = factory::update_by_id(&bookings, booking_id, set).await?;

    Ok(Json(booking.into()))
}

pub async fn delete(
    user: CurrentUser,
    State(bookings): State<BookingCollection>,
    PathObjectId(booking_id): PathObjectId,
) -> Result<StatusCode, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    factory::delete_by_id(&bookings, booking_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{extract::Query, Json};
    use bson::oid::ObjectId;

    use crate::{api::v1::tests::bootstrap, error::Error};

    fn callback_params(price: i64) -> Query<super::CallbackParams> {
        Query(super::CallbackParams {
            tour: ObjectId::new().into(),
            user: ObjectId::new().into(),
            price,
        })
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_bad_signature_persists_nothing() {
        let bootstrap = bootstrap().await;

        let err = super::callback(
            bootstrap.razorpay(),
            bootstrap.booking_collection(),
            callback_params(39700),
            Json(super::CallbackBody {
                razorpay_order_id: "order_MkWkAuzDRZVPkL".to_string(),
                razorpay_payment_id: "pay_MkWlEd9K3C0dFF".to_string(),
                razorpay_signature: "tampered".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::PaymentSignatureMismatch);

        let count = bootstrap
            .app_state
            .booking_collection
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_valid_callback_records_a_paid_booking() {
        let bootstrap = bootstrap().await;

        // signature computed with the bootstrap secret, test_key_secret
        let signature = {
            use hmac::{Hmac, Mac};
            let mut mac =
                Hmac::<sha2::Sha256>::new_from_slice(b"test_key_secret").expect("hmac key");
            mac.update(b"order_MkWkAuzDRZVPkL|pay_MkWlEd9K3C0dFF");
            hex::encode(mac.finalize().into_bytes())
        };

        let (status, Json(booking)) = super::callback(
            bootstrap.razorpay(),
            bootstrap.booking_collection(),
            callback_params(39700),
            Json(super::CallbackBody {
                razorpay_order_id: "order_MkWkAuzDRZVPkL".to_string(),
                razorpay_payment_id: "pay_MkWlEd9K3C0dFF".to_string(),
                razorpay_signature: signature,
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, axum::http::StatusCode::CREATED);
        assert!(booking.paid);
        assert_eq!(booking.price, 397.0);
        assert_eq!(booking.order_id.as_deref(), Some("order_MkWkAuzDRZVPkL"));
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_users_only_see_their_own_bookings() {
        let bootstrap = bootstrap().await;
        let other = bootstrap
            .derive("other@test.com", "password123", super::UserRole::User)
            .await;

        let err = super::index_for_user(
            other.current_user(),
            other.booking_collection(),
            crate::util::PathObjectId(bootstrap.user_id()),
            Default::default(),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }
}
