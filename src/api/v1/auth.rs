use argon2::Argon2;
use axum::{
    extract::{FromRef, FromRequestParts, State},
    headers::{authorization::Bearer, Authorization, Cookie, Header, SetCookie},
    http::{request::Parts, HeaderValue, StatusCode},
    Json, RequestPartsExt, TypedHeader,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::{Duration, OffsetDateTime};
use validator::Validate;

use crate::{
    email::Mailer,
    error::{Error, UnauthorizedType},
    mongo_ext::Collection,
    util::{hash_password, sha256_hex, verify_password, FormattedDateTime, ObjectIdString},
};

use super::token::{current_timestamp, decode_token, sign_token, JwtState};

pub const AUTH_COOKIE: &str = "jwt";

#[derive(Clone)]
pub struct UserCollection(pub Collection<UserModel>);

impl std::ops::Deref for UserCollection {
    type Target = Collection<UserModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,

    #[serde(default = "default_active")]
    pub active: bool,

    pub photo: Option<String>,

    pub password_changed_at: Option<bson::DateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<bson::DateTime>,

    pub created_at: bson::DateTime,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    Admin,
    LeadGuide,
    Guide,
    #[default]
    User,
}

impl UserModel {
    /// Tokens issued before the last password change are stale.
    pub fn password_changed_after(&self, token_issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => changed_at.timestamp_millis() / 1000 > token_issued_at,
            None => false,
        }
    }

    pub async fn find_active(
        users: &UserCollection,
        filter: bson::Document,
    ) -> Result<Option<Self>, Error> {
        let mut filter = filter;
        filter.insert("active", bson::doc! { "$ne": false });

        users.find_one(filter, None).await.map_err(Into::into)
    }
}

/// Static allow-list authorization against the authenticated user's role.
pub fn restrict_to(user: &UserModel, roles: &[UserRole]) -> Result<(), Error> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

/// The `protect` middleware: bearer/cookie token, expiry check, user still
/// exists (and is active), password unchanged since issuance.
#[derive(Debug)]
pub struct CurrentUser(pub UserModel);

impl std::ops::Deref for CurrentUser {
    type Target = UserModel;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl CurrentUser {
    pub async fn from_token(
        jwt_state: &JwtState,
        users: &UserCollection,
        token: &str,
    ) -> Result<Self, Error> {
        let token = decode_token(jwt_state, token)
            .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidToken))?;

        if token.claims.is_expired() {
            return Err(Error::Unauthorized(UnauthorizedType::TokenExpired));
        }

        let user = UserModel::find_active(users, bson::doc! { "_id": token.claims.sub.0 })
            .await?
            .ok_or(Error::Unauthorized(UnauthorizedType::InvalidToken))
            .tap_err(|_| tracing::debug!("token references a missing or inactive user"))?;

        if user.password_changed_after(token.claims.iat) {
            return Err(Error::Unauthorized(UnauthorizedType::PasswordChanged));
        }

        Ok(Self(user))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    JwtState: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map(|TypedHeader(Authorization(token))| token.token().to_string())
            .ok();

        let token = match bearer {
            Some(token) => token,
            None => parts
                .extract::<TypedHeader<Cookie>>()
                .await
                .ok()
                .and_then(|cookie| cookie.get(AUTH_COOKIE).map(ToString::to_string))
                .ok_or(Error::Unauthorized(UnauthorizedType::NotLoggedIn))
                .tap_err(|_| tracing::debug!("neither bearer header nor jwt cookie present"))?,
        };

        let jwt = JwtState::from_ref(state);
        let users = UserCollection::from_ref(state);

        Self::from_token(&jwt, &users, &token).await
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserResponse {
    pub id: ObjectIdString,

    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub photo: Option<String>,

    pub created_at: FormattedDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(value: UserModel) -> Self {
        Self {
            id: value.id.into(),
            name: value.name,
            email: value.email,
            role: value.role,
            photo: value.photo,

            created_at: value.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub token: String,
    pub user: UserResponse,
}

fn auth_cookie(value: &str) -> TypedHeader<SetCookie> {
    TypedHeader(
        SetCookie::decode(
            &mut [HeaderValue::from_str(value).unwrap()].as_slice().iter(),
        )
        .unwrap(),
    )
}

/// Token in the body and as an http-only cookie, per the login contract.
pub fn create_send_token(
    jwt_state: &JwtState,
    user: UserModel,
) -> Result<(TypedHeader<SetCookie>, Json<TokenResponse>), Error> {
    let signed = sign_token(jwt_state, user.id)?;

    let header = auth_cookie(&format!(
        "{}={}; HttpOnly; Path=/",
        AUTH_COOKIE, signed.token
    ));

    Ok((
        header,
        Json(TokenResponse {
            token: signed.token,
            user: user.into(),
        }),
    ))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 64))]
    pub password: String,

    #[validate(must_match = "password")]
    pub password_confirm: String,
}

#[derive(Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 64))]
    pub password: String,

    #[validate(must_match = "password")]
    pub password_confirm: String,

    pub role: UserRole,
}

pub async fn create_user(
    users: &UserCollection,
    argon: &Argon2<'_>,
    request: CreateUserRequest,
) -> Result<UserModel, Error> {
    request.validate()?;

    let count = users
        .count_documents(bson::doc! { "email": &request.email }, None)
        .await?;

    if count > 0 {
        return Err(Error::MustUniqueError("email"));
    }

    let model = UserModel {
        id: ObjectId::new(),
        name: request.name,
        email: request.email,
        password: hash_password(argon, &request.password)?,
        role: request.role,
        active: true,
        photo: None,
        password_changed_at: None,
        password_reset_token: None,
        password_reset_expires: None,
        created_at: OffsetDateTime::now_utc().into(),
    };
    users.insert_one(&model, None).await?;

    Ok(model)
}

pub async fn signup(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    State(jwt_state): State<JwtState>,
    State(mailer): State<Mailer>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl axum::response::IntoResponse, Error> {
    let user = create_user(
        &users,
        &argon,
        CreateUserRequest {
            name: request.name,
            email: request.email,
            password: request.password,
            password_confirm: request.password_confirm,
            role: UserRole::User,
        },
    )
    .await?;

    // best effort, signup never fails on a mail outage
    let welcome = mailer.clone();
    let (name, email) = (user.name.clone(), user.email.clone());
    tokio::spawn(async move {
        let _ = welcome
            .send_welcome(&name, &email)
            .await
            .tap_err(|err| tracing::warn!("welcome email failed: {}", err));
    });

    let (header, body) = create_send_token(&jwt_state, user)?;

    Ok((StatusCode::CREATED, header, body))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(users): State<UserCollection>,
    State(jwt_state): State<JwtState>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<LoginRequest>,
) -> Result<(TypedHeader<SetCookie>, Json<TokenResponse>), Error> {
    let user = UserModel::find_active(&users, bson::doc! { "email": &request.email }).await?;

    let user = match user {
        Some(user) if verify_password(&argon, &request.password, &user.password) => user,
        _ => {
            return Err(Error::Unauthorized(
                UnauthorizedType::WrongEmailOrPassword,
            ))
        }
    };

    create_send_token(&jwt_state, user)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn logout() -> (TypedHeader<SetCookie>, Json<MessageResponse>) {
    let header = auth_cookie(&format!("{}=loggedout; HttpOnly; Max-Age=5; Path=/", AUTH_COOKIE));

    (
        header,
        Json(MessageResponse {
            message: "logged out".to_string(),
        }),
    )
}

pub const RESET_TOKEN_VALIDITY: Duration = Duration::minutes(10);

/// Plaintext token goes into the mail, only its sha256 into the database.
pub fn generate_reset_token() -> (String, String) {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);

    let token = hex::encode(bytes);
    let hashed = sha256_hex(&token);

    (token, hashed)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

pub async fn forgot_password(
    State(users): State<UserCollection>,
    State(mailer): State<Mailer>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, Error> {
    let user = UserModel::find_active(&users, bson::doc! { "email": &request.email })
        .await?
        .ok_or(Error::NotFound("user"))?;

    let (token, hashed) = generate_reset_token();
    let expires = bson::DateTime::from(current_timestamp() + RESET_TOKEN_VALIDITY);

    users
        .update_one(
            bson::doc! { "_id": user.id },
            bson::doc! { "$set": {
                "password_reset_token": &hashed,
                "password_reset_expires": expires,
            }},
            None,
        )
        .await?;

    if let Err(err) = mailer.send_password_reset(&user.name, &user.email, &token).await {
        tracing::warn!("password reset email failed: {}", err);

        users
            .update_one(
                bson::doc! { "_id": user.id },
                bson::doc! { "$unset": {
                    "password_reset_token": "",
                    "password_reset_expires": "",
                }},
                None,
            )
            .await?;
    }

    Ok(Json(MessageResponse {
        message: "password reset link sent to email".to_string(),
    }))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, max = 64))]
    pub password: String,

    #[validate(must_match = "password")]
    pub password_confirm: String,
}

pub async fn reset_password(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    State(jwt_state): State<JwtState>,
    axum::extract::Path(token): axum::extract::Path<String>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<(TypedHeader<SetCookie>, Json<TokenResponse>), Error> {
    request.validate()?;

    let hashed = sha256_hex(&token);
    let now = bson::DateTime::from(current_timestamp());

    let user = UserModel::find_active(
        &users,
        bson::doc! {
            "password_reset_token": &hashed,
            "password_reset_expires": { "$gt": now },
        },
    )
    .await?
    .ok_or(Error::Unauthorized(UnauthorizedType::ResetTokenExpired))?;

    users
        .update_one(
            bson::doc! { "_id": user.id },
            bson::doc! {
                "$set": {
                    "password": hash_password(&argon, &request.password)?,
                    "password_changed_at": now,
                },
                "$unset": {
                    "password_reset_token": "",
                    "password_reset_expires": "",
                },
            },
            None,
        )
        .await?;

    let user = UserModel::find_active(&users, bson::doc! { "_id": user.id })
        .await?
        .ok_or(Error::Unauthorized(UnauthorizedType::InvalidToken))?;

    create_send_token(&jwt_state, user)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{extract::FromRequestParts, Json};
    use bson::oid::ObjectId;
    use time::{Duration, OffsetDateTime};
    use validator::Validate;

    use crate::{
        api::v1::tests::bootstrap,
        error::{Error, UnauthorizedType},
        util::sha256_hex,
    };

    use super::{RegisterRequest, UserModel, UserRole};

    fn user_with_password_changed_at(changed_at: Option<OffsetDateTime>) -> UserModel {
        UserModel {
            id: ObjectId::new(),
            name: "name".to_string(),
            email: "email@test.com".to_string(),
            password: String::new(),
            role: UserRole::default(),
            active: true,
            photo: None,
            password_changed_at: changed_at.map(Into::into),
            password_reset_token: None,
            password_reset_expires: None,
            created_at: OffsetDateTime::now_utc().into(),
        }
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(
            serde_json::to_string(&UserRole::LeadGuide).unwrap(),
            "\"lead-guide\""
        );
        assert_eq!(
            serde_json::from_str::<UserRole>("\"user\"").unwrap(),
            UserRole::User
        );
        assert_eq!(
            serde_json::from_str::<UserRole>("\"admin\"").unwrap(),
            UserRole::Admin
        );
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn password_changed_after_invalidates_older_tokens() {
        let now = OffsetDateTime::now_utc();
        let user = user_with_password_changed_at(Some(now));

        let issued_before = (now - Duration::hours(1)).unix_timestamp();
        let issued_after = (now + Duration::hours(1)).unix_timestamp();

        assert!(user.password_changed_after(issued_before));
        assert!(!user.password_changed_after(issued_after));

        let never_changed = user_with_password_changed_at(None);
        assert!(!never_changed.password_changed_after(issued_before));
    }

    #[test]
    fn register_request_password_mismatch_is_rejected() {
        let request = RegisterRequest {
            name: "name".to_string(),
            email: "email@test.com".to_string(),
            password: "password123".to_string(),
            password_confirm: "different123".to_string(),
        };

        request.validate().unwrap_err();
    }

    #[test]
    fn register_request_bad_email_is_rejected() {
        let request = RegisterRequest {
            name: "name".to_string(),
            email: "not-an-email".to_string(),
            password: "password123".to_string(),
            password_confirm: "password123".to_string(),
        };

        request.validate().unwrap_err();
    }

    #[test]
    fn reset_token_hash_is_stable() {
        let (token, hashed) = super::generate_reset_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hashed, sha256_hex(&token));
        assert_ne!(token, hashed);
    }

    #[test]
    fn restrict_to_checks_the_allow_list() {
        let mut user = user_with_password_changed_at(None);

        user.role = UserRole::Admin;
        super::restrict_to(&user, &[UserRole::Admin]).unwrap();

        user.role = UserRole::Guide;
        let err = super::restrict_to(&user, &[UserRole::Admin]).unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_signup_and_login() {
        let bootstrap = bootstrap().await;

        let _ = super::signup(
            bootstrap.user_collection(),
            bootstrap.argon(),
            bootstrap.jwt_state(),
            bootstrap.mailer(),
            Json(RegisterRequest {
                name: "name".to_string(),
                email: "signup@test.com".to_string(),
                password: "password123".to_string(),
                password_confirm: "password123".to_string(),
            }),
        )
        .await
        .unwrap();

        let (_, Json(login)) = super::login(
            bootstrap.user_collection(),
            bootstrap.jwt_state(),
            bootstrap.argon(),
            Json(super::LoginRequest {
                email: "signup@test.com".to_string(),
                password: "password123".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(login.user.email, "signup@test.com");

        let err = super::login(
            bootstrap.user_collection(),
            bootstrap.jwt_state(),
            bootstrap.argon(),
            Json(super::LoginRequest {
                email: "signup@test.com".to_string(),
                password: "wrongpassword".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(
            err,
            Error::Unauthorized(UnauthorizedType::WrongEmailOrPassword)
        );
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_unique_email() {
        let bootstrap = bootstrap().await;

        let request = RegisterRequest {
            name: "name".to_string(),
            email: "dup@test.com".to_string(),
            password: "password123".to_string(),
            password_confirm: "password123".to_string(),
        };

        let _ = super::signup(
            bootstrap.user_collection(),
            bootstrap.argon(),
            bootstrap.jwt_state(),
            bootstrap.mailer(),
            Json(request.clone()),
        )
        .await
        .unwrap();

        // .err() first, the success arm is an opaque response type
        let err = super::signup(
            bootstrap.user_collection(),
            bootstrap.argon(),
            bootstrap.jwt_state(),
            bootstrap.mailer(),
            Json(request),
        )
        .await
        .err()
        .unwrap();
        assert_matches!(err, Error::MustUniqueError("email"));
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_token_issued_before_password_change_is_rejected() {
        let bootstrap = bootstrap().await;

        // issued an hour ago, password changes now
        let token = crate::api::v1::token::sign_token_with(
            &bootstrap.app_state.jwt_state,
            bootstrap.user_id(),
            (OffsetDateTime::now_utc() - Duration::hours(1)).unix_timestamp(),
            (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp(),
        )
        .unwrap();

        bootstrap
            .app_state
            .user_collection
            .update_one(
                bson::doc! { "_id": bootstrap.user_id() },
                bson::doc! { "$set": {
                    "password_changed_at": bson::DateTime::from(OffsetDateTime::now_utc()),
                }},
                None,
            )
            .await
            .unwrap();

        let err = super::CurrentUser::from_token(
            &bootstrap.app_state.jwt_state,
            &bootstrap.app_state.user_collection,
            &token,
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Unauthorized(UnauthorizedType::PasswordChanged));
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (MONGODB_URI)"]
    async fn test_current_user_extractor() {
        let bootstrap = bootstrap().await;

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .header(
                "Authorization",
                format!("Bearer {}", bootstrap.user_token()),
            )
            .body(())
            .unwrap()
            .into_parts();

        let user = super::CurrentUser::from_request_parts(&mut parts, &bootstrap.app_state)
            .await
            .unwrap();
        assert_eq!(user.id, bootstrap.user_id());

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .header("Cookie", format!("jwt={}", bootstrap.user_token()))
            .body(())
            .unwrap()
            .into_parts();

        let user = super::CurrentUser::from_request_parts(&mut parts, &bootstrap.app_state)
            .await
            .unwrap();
        assert_eq!(user.id, bootstrap.user_id());

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .body(())
            .unwrap()
            .into_parts();

        let err = super::CurrentUser::from_request_parts(&mut parts, &bootstrap.app_state)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Unauthorized(UnauthorizedType::NotLoggedIn));
    }
}
