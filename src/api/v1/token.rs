use bson::oid::ObjectId;
use jsonwebtoken::TokenData;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{error::Error, util::ObjectIdString};

#[derive(Clone)]
pub struct JwtState {
    validation: jsonwebtoken::Validation,
    header: jsonwebtoken::Header,

    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,

    expires_in: Duration,
}

impl JwtState {
    pub fn new(secret: &[u8], expires_in_days: i64) -> Self {
        let encoding_key = jsonwebtoken::EncodingKey::from_secret(secret);
        let decoding_key = jsonwebtoken::DecodingKey::from_secret(secret);

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        // expiry is checked against the claims manually so an expired token
        // yields a tagged 401 instead of a generic decode failure
        validation.validate_exp = false;

        Self {
            header,
            validation,

            encoding_key,
            decoding_key,

            expires_in: Duration::days(expires_in_days),
        }
    }

    pub fn new_from_env() -> Self {
        let secret = std::env::var("JWT_SECRET")
            .expect("Cannot retrieve JWT_SECRET from environment variable.");

        let expires_in_days = std::env::var("JWT_EXPIRES_IN_DAYS")
            .ok()
            .and_then(|it| it.parse().ok())
            .unwrap_or(90);

        Self::new(secret.as_bytes(), expires_in_days)
    }
}

pub fn current_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AccessTokenClaims {
    pub sub: ObjectIdString,
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn is_expired(&self) -> bool {
        self.exp < current_timestamp().unix_timestamp()
    }
}

pub struct SignedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

pub fn sign_token(jwt_state: &JwtState, user_id: ObjectId) -> Result<SignedToken, Error> {
    let issued_at = current_timestamp();
    let expires_at = issued_at + jwt_state.expires_in;

    let token = sign_token_with(
        jwt_state,
        user_id,
        issued_at.unix_timestamp(),
        expires_at.unix_timestamp(),
    )?;

    Ok(SignedToken { token, expires_at })
}

pub fn sign_token_with(
    jwt_state: &JwtState,
    user_id: ObjectId,
    iat: i64,
    exp: i64,
) -> Result<String, Error> {
    let claims = AccessTokenClaims {
        sub: user_id.into(),
        iat,
        exp,
    };

    jsonwebtoken::encode(&jwt_state.header, &claims, &jwt_state.encoding_key).map_err(Into::into)
}

pub fn decode_token(
    jwt_state: &JwtState,
    token: &str,
) -> Result<TokenData<AccessTokenClaims>, Error> {
    jsonwebtoken::decode(token, &jwt_state.decoding_key, &jwt_state.validation).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn jwt() -> JwtState {
        JwtState::new(b"unit-test-secret", 90)
    }

    #[test]
    fn sign_and_decode() {
        let jwt = jwt();
        let user_id = ObjectId::new();

        let signed = sign_token(&jwt, user_id).unwrap();
        let token = decode_token(&jwt, &signed.token).unwrap();

        assert_eq!(token.claims.sub, user_id);
        assert!(!token.claims.is_expired());
        assert!(token.claims.iat <= current_timestamp().unix_timestamp());
    }

    #[test]
    fn expired_token_is_flagged() {
        let jwt = jwt();
        let user_id = ObjectId::new();

        let exp = (current_timestamp() - Duration::seconds(1)).unix_timestamp();
        let token = sign_token_with(&jwt, user_id, exp - 60, exp).unwrap();

        let token = decode_token(&jwt, &token).unwrap();
        assert!(token.claims.is_expired());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let user_id = ObjectId::new();
        let signed = sign_token(&jwt(), user_id).unwrap();

        let other = JwtState::new(b"another-secret", 90);
        decode_token(&other, &signed.token).unwrap_err();
    }

    #[test]
    fn garbage_is_rejected() {
        decode_token(&jwt(), "not-a-jwt").unwrap_err();
    }
}
