use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{parse_id, JsonBody, MessageResponse};
use crate::auth::AuthUser;
use crate::error::{AppError, StoreError};
use crate::state::AppState;
use crate::types::Folder;

const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=50;

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub name: String,
}

/// POST /folder
pub async fn create_folder(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<CreateFolderRequest>,
) -> Result<(StatusCode, Json<Folder>), AppError> {
    let name = payload.name;
    if name.trim().is_empty() {
        return Err(AppError::Validation("Folder name is required".to_string()));
    }
    if !NAME_LEN.contains(&name.chars().count()) {
        return Err(AppError::Validation(
            "Folder name must be between 3 and 50 characters".to_string(),
        ));
    }

    let exists = || AppError::Validation("Folder name already exists".to_string());
    if state.store.find_folder_by_name(auth.id, &name).await?.is_some() {
        return Err(exists());
    }

    let folder = Folder {
        id: Uuid::new_v4(),
        user_id: auth.id,
        name,
        created_at: Utc::now(),
    };
    state.store.insert_folder(&folder).await.map_err(|e| match e {
        StoreError::Duplicate => exists(),
        other => other.into(),
    })?;

    info!("User {} created folder {}", auth.id, folder.id);
    Ok((StatusCode::CREATED, Json(folder)))
}

/// GET /folder
pub async fn list_folders(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Folder>>, AppError> {
    Ok(Json(state.store.list_folders(auth.id).await?))
}

/// DELETE /folder/:id - Only the owner may delete
pub async fn delete_folder(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id(&id, "Invalid folder ID")?;

    let folder = state
        .store
        .find_folder(id)
        .await?
        .ok_or(AppError::NotFound("Folder not found"))?;

    if folder.user_id != auth.id {
        return Err(AppError::Forbidden(
            "Not authorized to delete this folder".to_string(),
        ));
    }

    state.store.delete_folder(id).await?;
    Ok(MessageResponse::new("Folder deleted successfully"))
}
