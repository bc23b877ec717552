use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::JwtConfig, error::AppError};

/// Signed session assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,     // user ID
    pub email: String, // user email
    pub iat: i64,      // issued at (unix timestamp)
    pub exp: i64,      // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: TimeDuration,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: TimeDuration::minutes(cfg.ttl_minutes),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, email, OffsetDateTime::now_utc())
    }

    fn issue_at(
        &self,
        user_id: Uuid,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below with no leeway: valid only while now < exp.
        validation.validate_exp = false;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }

    /// Verifies a still-valid token and issues a fresh one for the same subject.
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.verify(token)?;
        self.issue(claims.sub, &claims.email)
    }
}

/// Removes an optional `Bearer ` scheme prefix.
pub fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim()
}

/// Authenticated caller, taken from a verified `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenService::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let claims = tokens.verify(strip_bearer(header)).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            AppError::Unauthorized
        })?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_service(secret: &str, issuer: &str, audience: &str) -> TokenService {
        TokenService::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 60,
        })
    }

    fn service() -> TokenService {
        make_service("dev-secret-dev-secret-dev-secret-00", "test-issuer", "test-aud")
    }

    #[test]
    fn issue_then_verify_keeps_subject() {
        let keys = service();
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id, "a@x.com").expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 60 * 60);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = service();
        let issued = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let token = keys.issue_at(Uuid::new_v4(), "a@x.com", issued).unwrap();
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn token_is_expired_exactly_at_exp() {
        let keys = service();
        let issued = OffsetDateTime::now_utc();
        let token = keys.issue_at(Uuid::new_v4(), "a@x.com", issued).unwrap();
        let at_exp = issued + TimeDuration::minutes(60);
        assert_eq!(keys.verify_at(&token, at_exp).unwrap_err(), TokenError::Expired);
        let just_before = at_exp - TimeDuration::seconds(1);
        assert!(keys.verify_at(&token, just_before).is_ok());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let keys = service();
        let token = keys.issue(Uuid::new_v4(), "a@x.com").unwrap();
        let (head, sig) = token.rsplit_once('.').unwrap();
        let first = sig.chars().next().unwrap();
        let swapped = if first == 'A' { 'B' } else { 'A' };
        let forged = format!("{head}.{swapped}{}", &sig[1..]);
        assert_eq!(keys.verify(&forged).unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn other_secret_is_an_invalid_signature() {
        let ours = service();
        let theirs = make_service("another-secret-another-secret-0000", "test-issuer", "test-aud");
        let token = theirs.issue(Uuid::new_v4(), "a@x.com").unwrap();
        assert_eq!(ours.verify(&token).unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(service().verify("not-a-jwt").unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let good = service();
        let bad = make_service("dev-secret-dev-secret-dev-secret-00", "test-issuer", "other-aud");
        let token = good.issue(Uuid::new_v4(), "a@x.com").unwrap();
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn refresh_renews_valid_token_for_same_subject() {
        let keys = service();
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id, "a@x.com").unwrap();
        let renewed = keys.refresh(&token).expect("refresh");
        let claims = keys.verify(&renewed).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@x.com");
    }

    #[test]
    fn refresh_of_expired_token_fails() {
        let keys = service();
        let issued = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let token = keys.issue_at(Uuid::new_v4(), "a@x.com", issued).unwrap();
        assert_eq!(keys.refresh(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn strip_bearer_is_optional() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("bearer abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
    }
}
