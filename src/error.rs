use std::sync::OnceLock;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("no {0} found with this id")]
    NotFound(&'static str),

    #[error("{0} must be unique")]
    MustUniqueError(&'static str),

    #[error("{0}")]
    Unauthorized(UnauthorizedType),

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("payment signature does not match the order")]
    PaymentSignatureMismatch,

    #[error("{0}")]
    PasswordHashError(#[from] password_hash::Error),

    #[error("{0}")]
    DatabaseError(#[from] mongodb::error::Error),

    #[error("{0}")]
    JWTError(#[from] jsonwebtoken::errors::Error),

    #[error("{0}")]
    BSONSerError(#[from] bson::ser::Error),

    #[error("{0}")]
    BSONDeError(#[from] bson::de::Error),

    #[error("{0}")]
    PaymentProviderError(#[from] reqwest::Error),

    #[error("{0}")]
    ImageError(#[from] image::ImageError),

    #[error("{0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),

    #[error("{0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum UnauthorizedType {
    #[error("you are not logged in, please login to get access")]
    NotLoggedIn,

    #[error("incorrect email or password")]
    WrongEmailOrPassword,

    #[error("invalid token, please login again")]
    InvalidToken,

    #[error("token expired, please login again")]
    TokenExpired,

    #[error("password was changed after this token was issued, please login again")]
    PasswordChanged,

    #[error("password reset link is invalid or has expired")]
    ResetTokenExpired,
}

impl Error {
    /// Expected, user-facing failures as opposed to internal faults.
    pub fn is_operational(&self) -> bool {
        match self {
            Self::ValidationError(..)
            | Self::BadRequest(..)
            | Self::NotFound(..)
            | Self::MustUniqueError(..)
            | Self::Unauthorized(..)
            | Self::Forbidden
            | Self::PaymentSignatureMismatch => true,
            Self::PasswordHashError(..)
            | Self::DatabaseError(..)
            | Self::JWTError(..)
            | Self::BSONSerError(..)
            | Self::BSONDeError(..)
            | Self::PaymentProviderError(..)
            | Self::ImageError(..)
            | Self::MultipartError(..)
            | Self::IoError(..) => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(..)
            | Self::BadRequest(..)
            | Self::MustUniqueError(..)
            | Self::PaymentSignatureMismatch
            | Self::MultipartError(..) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(..) => StatusCode::NOT_FOUND,
            Self::PasswordHashError(..)
            | Self::DatabaseError(..)
            | Self::JWTError(..)
            | Self::BSONSerError(..)
            | Self::BSONDeError(..)
            | Self::PaymentProviderError(..)
            | Self::ImageError(..)
            | Self::IoError(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error internals are only exposed outside production.
pub fn dev_mode() -> bool {
    static DEV: OnceLock<bool> = OnceLock::new();
    *DEV.get_or_init(|| {
        std::env::var("APP_ENV")
            .map(|it| it != "production")
            .unwrap_or(true)
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<serde_json::Value>,
    r#type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl From<Error> for ErrorJson {
    fn from(err: Error) -> Self {
        let message = if err.is_operational() || dev_mode() {
            err.to_string()
        } else {
            "something went wrong".to_string()
        };

        let r#type = err.to_string_variant();

        let detail = match dev_mode() {
            true => Some(format!("{:?}", err)),
            false => None,
        };

        let errors = match err {
            Error::ValidationError(err) => serde_json::to_value(err).ok(),
            _ => None,
        };

        Self {
            errors,
            r#type,
            message,
            detail,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        if self.is_operational() {
            tracing::debug!("operational error: {:?}", self);
        } else {
            tracing::error!("internal error: {:?}", self);
        }

        let status = self.status_code();
        let error = ErrorJson::from(self);

        (status, Json(error)).into_response()
    }
}

impl Error {
    pub fn to_string_variant(&self) -> String {
        macro_rules! match_var {
            ($id:ident !) => {
                Self::$id
            };
            ($id:ident (..)) => {
                Self::$id(..)
            };
        }

        macro_rules! variant {
            ($($name:ident $tt:tt),+) => {
                match self {
                    $(
                        match_var!($name $tt) => {
                            stringify!($name)
                        }
                    )+
                }
            };
        }

        variant! {
            ValidationError(..),
            BadRequest(..),
            NotFound(..),
            MustUniqueError(..),
            Unauthorized(..),
            Forbidden!,
            PaymentSignatureMismatch!,
            PasswordHashError(..),
            DatabaseError(..),
            JWTError(..),
            BSONSerError(..),
            BSONDeError(..),
            PaymentProviderError(..),
            ImageError(..),
            MultipartError(..),
            IoError(..)
        }
        .to_string()
    }
}

impl From<axum::extract::rejection::PathRejection> for Error {
    fn from(_value: axum::extract::rejection::PathRejection) -> Self {
        Self::BadRequest("malformed path parameter")
    }
}
