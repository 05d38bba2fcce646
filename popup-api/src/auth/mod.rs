//! Account authentication
//!
//! Passwords are stored as Argon2id hashes; sessions are stateless HS256
//! tokens carrying the user id. Handlers take an [`AuthUser`] argument to
//! require a valid token.

pub mod password;
pub mod token;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub use password::{hash_password, verify_password, PasswordError};
pub use token::{extract_token, Claims, TokenIssuer};

/// Identity of the caller, taken from a verified token
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|h| h.to_str().ok());

        let token = extract_token(header("x-auth-token"), header("authorization"))
            .ok_or_else(|| AppError::Unauthorized("No token, authorization denied".to_string()))?;

        let claims = state.tokens.verify(token)?;
        Ok(AuthUser { id: claims.sub })
    }
}
