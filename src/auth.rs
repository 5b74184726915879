//! Password hashing, bearer tokens and the authenticated-user extractors

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::aggregates::{User, UserType};
use crate::error::ApiError;
use crate::AppState;

pub fn hash_password(password: &str) -> Result<String, argon2::Error> {
    let salt = uuid::Uuid::new_v4();
    argon2::hash_encoded(password.as_bytes(), salt.as_bytes(), &argon2::Config::default())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: UserType,
    pub exp: usize,
}

/// HS256 signing keys and token lifetime.
#[derive(Clone)]
pub struct AuthConfig {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl AuthConfig {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let exp = usize::try_from(now.saturating_add(self.ttl.as_secs())).unwrap_or(usize::MAX);
        let claims = Claims { sub: user.id, email: user.email.to_string(), role: user.user_type, exp };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Ok(jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())?.claims)
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// An active user identified by the bearer token.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(&parts.headers).ok_or_else(|| ApiError::Unauthorized("authentication required".into()))?;
        let claims = state.auth.verify(token).map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))?;
        match state.store.user(claims.sub).await? {
            Some(user) if user.is_active => Ok(AuthUser(user)),
            _ => Err(ApiError::Unauthorized("invalid or expired token".into())),
        }
    }
}

/// An active user of type `shop`.
pub struct Partner(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for Partner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_partner() {
            return Err(ApiError::Forbidden("only partners can do this".into()));
        }
        Ok(Partner(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Email;

    fn user() -> User {
        User {
            id: 42,
            email: Email::new("shop@example.com").unwrap(),
            first_name: "A".into(),
            last_name: "B".into(),
            company: "C".into(),
            position: "D".into(),
            password_hash: String::new(),
            is_active: true,
            user_type: UserType::Shop,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("TestPassword1").unwrap();
        assert!(verify_password(&hash, "TestPassword1"));
        assert!(!verify_password(&hash, "TestPassword2"));
        assert!(!verify_password("not-a-hash", "TestPassword1"));
    }

    #[test]
    fn test_token_claims() {
        let auth = AuthConfig::new("secret", Duration::from_secs(60));
        let token = auth.issue(&user()).unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, UserType::Shop);
        assert!(AuthConfig::new("other", Duration::from_secs(60)).verify(&token).is_err());
    }

    #[test]
    fn test_expiry_saturates_on_huge_ttl() {
        let auth = AuthConfig::new("secret", Duration::from_secs(u64::MAX));
        let claims = auth.verify(&auth.issue(&user()).unwrap()).unwrap();
        assert!(claims.exp > 0);
    }

    #[test]
    fn test_bearer_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), None);
        headers.insert(AUTHORIZATION, "Token abc".parse().unwrap());
        assert_eq!(bearer(&headers), None);
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers), Some("abc"));
    }
}
