//! Error types and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::PasswordError;

/// Failure reported by a [`Store`](crate::store::Store) backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Unique constraint violation (PostgreSQL error code 23505)
    #[error("duplicate record")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, separating unique violations from the rest
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Duplicate;
            }
        }
        StoreError::Database(e)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidIdentifier(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("password failure: {0}")]
    Password(#[from] PasswordError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidIdentifier(_)
            | AppError::InvalidArgument(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Store(_) | AppError::Password(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Internal causes stay in the server log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{}", self);
            "Server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
