use argon2::Argon2;
use axum::{
    extract::{Multipart, State},
    headers::SetCookie,
    http::StatusCode,
    Json, TypedHeader,
};
use bson::Document;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    media,
    util::{hash_password, verify_password, PathObjectId},
};

use super::{
    auth::{
        create_send_token, restrict_to, CurrentUser, TokenResponse, UserCollection, UserModel,
        UserResponse, UserRole,
    },
    factory::{self, Resource},
    query::ListParams,
    token::JwtState,
};

impl Resource for UserModel {
    const NAME: &'static str = "user";
}

pub async fn get_me(user: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(user.0))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateMeRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

/// Name and email only; password changes go through their own route so the
/// changed-at stamp and re-hash never get skipped.
#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn update_me(
    user: CurrentUser,
    State(users): State<UserCollection>,
    Json(request): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, Error> {
    if request.password.is_some() || request.password_confirm.is_some() {
        return Err(Error::BadRequest(
            "this route is not for password updates, use /update-my-password",
        ));
    }

    request.validate()?;

    let mut set = Document::new();
    if let Some(name) = &request.name {
        set.insert("name", name);
    }
    if let Some(email) = &request.email {
        if email != &user.email {
            let count = users
                .count_documents(bson::doc! { "email": email }, None)
                .await?;

            if count > 0 {
                return Err(Error::MustUniqueError("email"));
            }
        }
        set.insert("email", email);
    }
    if set.is_empty() {
        return Err(Error::BadRequest("nothing to update"));
    }

    let updated = factory::update_by_id(&users, user.id, set).await?;

    Ok(Json(updated.into()))
}

/// Single multipart `photo` field, resized to a 500x500 JPEG under
/// `public/img/users/`.
#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn upload_my_photo(
    user: CurrentUser,
    State(users): State<UserCollection>,
    mut multipart: Multipart,
) -> Result<Json<UserResponse>, Error> {
    let mut photo = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("photo") {
            return Err(Error::BadRequest("unknown field, expected photo"));
        }

        if !media::is_image(field.content_type()) {
            return Err(Error::BadRequest("please upload images only"));
        }

        let data = field.bytes().await?;

        let filename = format!(
            "user-{}-{}.jpeg",
            user.id,
            OffsetDateTime::now_utc().unix_timestamp()
        );
        media::resize_to_jpeg(&data, 500, 500, format!("public/img/users/{}", filename))?;

        photo = Some(filename);
    }

    let photo = photo.ok_or(Error::BadRequest("no photo supplied"))?;

    let updated = factory::update_by_id(&users, user.id, bson::doc! { "photo": photo }).await?;

    Ok(Json(updated.into()))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct UpdateMyPasswordRequest {
    pub password_current: String,

    #[validate(length(min = 8, max = 64))]
    pub password: String,

    #[validate(must_match = "password")]
    pub password_confirm: String,
}

/// Verifies the current password, re-hashes and stamps the change, then
/// issues a fresh token since the old one just became stale.
#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn update_my_password(
    user: CurrentUser,
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    State(jwt_state): State<JwtState>,
    Json(request): Json<UpdateMyPasswordRequest>,
) -> Result<(TypedHeader<SetCookie>, Json<TokenResponse>), Error> {
    request.validate()?;

    if !verify_password(&argon, &request.password_current, &user.password) {
        return Err(Error::BadRequest("current password is incorrect"))
            .tap_err(|_| tracing::debug!("password update with a wrong current password"));
    }

    let now = bson::DateTime::from(OffsetDateTime::now_utc());

    users
        .update_one(
            bson::doc! { "_id": user.id },
            bson::doc! { "$set": {
                "password": hash_password(&argon, &request.password)?,
                "password_changed_at": now,
            }},
            None,
        )
        .await?;

    let user = UserModel::find_active(&users, bson::doc! { "_id": user.id })
        .await?
        .ok_or(Error::NotFound("user"))?;

    create_send_token(&jwt_state, user)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteMeRequest {
    pub password: String,
}

/// Soft delete: the account goes inactive and disappears from every
/// find-family query, but the document stays.
#[tracing::instrument(skip_all, fields(user = %user.id))]
pub async fn delete_me(
    user: CurrentUser,
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<DeleteMeRequest>,
) -> Result<StatusCode, Error> {
    if !verify_password(&argon, &request.password, &user.password) {
        return Err(Error::BadRequest("current password is incorrect"));
    }

    users
        .update_one(
            bson::doc! { "_id": user.id },
            bson::doc! { "$set": { "active": false } },
            None,
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserIndexResponse {
    pub results: usize,
    pub users: Vec<UserResponse>,
}

pub async fn index(
    user: CurrentUser,
    State(users): State<UserCollection>,
    params: ListParams,
) -> Result<Json<UserIndexResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    let users = factory::find_all(&users, Document::new(), &params).await?;
    let users: Vec<UserResponse> = users.into_iter().map(Into::into).collect();

    Ok(Json(UserIndexResponse {
        results: users.len(),
        users,
    }))
}

pub async fn show(
    user: CurrentUser,
    State(users): State<UserCollection>,
    PathObjectId(user_id): PathObjectId,
) -> Result<Json<UserResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    let found = factory::find_by_id(&users, user_id).await?;

    Ok(Json(found.into()))
}

/// Signup owns user creation; the admin collection route only manages
/// existing accounts.
pub async fn create(user: CurrentUser) -> Result<StatusCode, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    Err(Error::BadRequest("this route is not defined, use /signup"))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    pub role: Option<UserRole>,
    pub active: Option<bool>,
    pub photo: Option<String>,
}

/// Admin update; passwords are deliberately not updatable here.
#[tracing::instrument(skip_all, fields(id = %user_id, user = %user.id))]
pub async fn update(
    user: CurrentUser,
    State(users): State<UserCollection>,
    PathObjectId(user_id): PathObjectId,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    request.validate()?;

    let mut set = Document::new();
    if let Some(name) = &request.name {
        set.insert("name", name);
    }
    if let Some(email) = &request.email {
        let count = users
            .count_documents(
                bson::doc! { "email": email, "_id": { "$ne": user_id } },
                None,
            )
            .await?;

        if count > 0 {
            return Err(Error::MustUniqueError("email"));
        }
        set.insert("email", email);
    }
    if let Some(role) = request.role {
        set.insert("role", bson::to_bson(&role)?);
    }
    if let Some(active) = request.active {
        set.insert("active", active);
    }
    if let Some(photo) = &request.photo {
        set.insert("photo", photo);
    }
    if set.is_empty() {
        return Err(Error::BadRequest("nothing to update"));
    }

    let updated = factory::update_by_id(&users, user_id, set).await?;

    Ok(Json(updated.into()))
}

#[tracing::instrument(skip_all, fields(id = %user_id, user = %user.id))]
pub async fn delete(
    user: CurrentUser,
    State(users): State<UserCollection>,
    PathObjectId(user_id): PathObjectId,
) -> Result<StatusCode, Error> {
    restrict_to(&user, &[UserRole::Admin])?;

    factory::delete_by_id(&users, user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
