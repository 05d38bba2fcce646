//! Account endpoints: signup, login, profile, update, logout

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{JsonBody, MessageResponse};
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::{AppError, StoreError};
use crate::state::AppState;
use crate::types::{User, UserProfile};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: SignupUser,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

const INVALID_CREDENTIALS: &str = "Invalid credentials";

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && domain.contains('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    if payload.password != payload.confirm_password {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }

    if state.store.find_user_by_email(&payload.email).await?.is_some() {
        return Err(AppError::Validation("User already exists".to_string()));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: payload.username,
        email: payload.email,
        password_hash: hash_password(&payload.password)?,
        created_at: Utc::now(),
    };

    // The email may be claimed between the lookup and the insert
    state.store.insert_user(&user).await.map_err(|e| match e {
        StoreError::Duplicate => AppError::Validation("User already exists".to_string()),
        other => other.into(),
    })?;

    let token = state.tokens.issue(user.id)?;
    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully".to_string(),
            user: SignupUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
            token,
        }),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::Validation(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!("Failed login for user {}", user.id);
        return Err(AppError::Validation(INVALID_CREDENTIALS.to_string()));
    }

    let token = state.tokens.issue(user.id)?;
    Ok(Json(TokenResponse { token }))
}

/// GET /user - Profile of the token holder
pub async fn current_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .store
        .find_user(auth.id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    Ok(Json(UserProfile::from(&user)))
}

/// PUT /update - Change name, email and password
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let mut problems = Vec::new();
    if payload.name.trim().is_empty() {
        problems.push("Name is required");
    }
    if !looks_like_email(&payload.email) {
        problems.push("Please include a valid email");
    }
    if payload.old_password.is_none() {
        problems.push("Old password is required");
    }
    if payload.new_password.is_none() {
        problems.push("New password is required");
    }

    let (Some(old_password), Some(new_password)) = (payload.old_password, payload.new_password) else {
        return Err(AppError::Validation(problems.join("; ")));
    };
    if !problems.is_empty() {
        return Err(AppError::Validation(problems.join("; ")));
    }

    let mut user = state
        .store
        .find_user(auth.id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    if !verify_password(&old_password, &user.password_hash)? {
        return Err(AppError::Validation("Invalid old password".to_string()));
    }

    user.username = payload.name;
    user.email = payload.email;
    user.password_hash = hash_password(&new_password)?;

    state.store.update_user(&user).await.map_err(|e| match e {
        StoreError::Duplicate => AppError::Validation("Email already in use".to_string()),
        other => other.into(),
    })?;

    Ok(MessageResponse::new("User details updated successfully"))
}

/// POST /logout - Tokens are stateless; the client discards its copy
pub async fn logout() -> Json<MessageResponse> {
    MessageResponse::new("Logged out successfully")
}
