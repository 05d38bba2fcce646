//! Signed bearer tokens (HS256 JWT)

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    expiry_seconds: i64,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>, expiry_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            expiry_seconds,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Unauthorized("Token has expired".to_string()),
            _ => AppError::Unauthorized("Token is not valid".to_string()),
        })
    }
}

/// Pull the token out of `x-auth-token` or `Authorization: Bearer <token>`
pub fn extract_token<'a>(x_auth_token: Option<&'a str>, authorization: Option<&'a str>) -> Option<&'a str> {
    if let Some(token) = x_auth_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token);
    }

    authorization
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
