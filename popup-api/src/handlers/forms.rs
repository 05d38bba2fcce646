//! Form catalog endpoints. Popups are embedded in their form and edited
//! through it; chats copy them at creation time.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{parse_id, JsonBody, MessageResponse};
use crate::auth::AuthUser;
use crate::error::{AppError, StoreError};
use crate::state::AppState;
use crate::types::{Form, Popup};

const INVALID_FORM_ID: &str = "Invalid form ID";
const DUPLICATE_FORM_NAME: &str = "A form with this name already exists in the selected folder";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormRequest {
    #[serde(default)]
    pub name: String,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFormsQuery {
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFormRequest {
    pub name: Option<String>,
    /// Absent leaves the folder alone; `null` moves the form out of its folder
    #[serde(default, deserialize_with = "present")]
    pub folder_id: Option<Option<Uuid>>,
}

/// Tell a field sent as `null` apart from one left out
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct PopupCreated {
    pub message: String,
    pub popup: Popup,
}

#[derive(Debug, Serialize)]
pub struct PopupsResponse {
    pub popups: Vec<Popup>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePopupRequest {
    #[serde(default)]
    pub content: String,
}

/// Load a form the caller owns
async fn owned_form(state: &AppState, auth: AuthUser, raw_id: &str) -> Result<Form, AppError> {
    let id = parse_id(raw_id, INVALID_FORM_ID)?;
    let form = state
        .store
        .find_form(id)
        .await?
        .ok_or(AppError::NotFound("Form not found"))?;

    if form.user_id != auth.id {
        return Err(AppError::Forbidden("Not authorized to modify this form".to_string()));
    }
    Ok(form)
}

fn form_write_error(err: StoreError) -> AppError {
    match err {
        StoreError::Duplicate => AppError::Validation(DUPLICATE_FORM_NAME.to_string()),
        other => other.into(),
    }
}

fn parse_popup_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidIdentifier("Invalid popup ID"))
}

/// POST /Form
pub async fn create_form(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<CreateFormRequest>,
) -> Result<(StatusCode, Json<Form>), AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Form name is required".to_string()));
    }

    let form = Form {
        id: Uuid::new_v4(),
        user_id: auth.id,
        folder_id: payload.folder_id,
        name,
        popups: Vec::new(),
        created_at: Utc::now(),
    };
    state.store.insert_form(&form).await.map_err(form_write_error)?;

    info!("User {} created form {}", auth.id, form.id);
    Ok((StatusCode::CREATED, Json(form)))
}

/// GET /Form?folderId= - `folderId=null` is the same as no filter
pub async fn list_forms(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListFormsQuery>,
) -> Result<Json<Vec<Form>>, AppError> {
    let folder_id = match query.folder_id.as_deref() {
        None | Some("null") => None,
        Some(raw) => Some(parse_id(raw, "Invalid folder ID")?),
    };

    Ok(Json(state.store.list_forms(auth.id, folder_id).await?))
}

/// PUT /Form/:formId - Rename or move a form, or take it out of its folder
pub async fn update_form(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(form_id): Path<String>,
    JsonBody(payload): JsonBody<UpdateFormRequest>,
) -> Result<Json<Form>, AppError> {
    let mut form = owned_form(&state, auth, &form_id).await?;

    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Form name is required".to_string()));
        }
        form.name = name;
    }
    if let Some(folder_id) = payload.folder_id {
        form.folder_id = folder_id;
    }

    state.store.update_form(&form).await.map_err(form_write_error)?;
    Ok(Json(form))
}

/// DELETE /Form/:id
pub async fn delete_form(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let form = owned_form(&state, auth, &id).await?;

    if !state.store.delete_form(form.id).await? {
        return Err(AppError::NotFound("Form not found"));
    }
    Ok(MessageResponse::new("Form deleted successfully"))
}

/// POST /Form/:formId/Popup
pub async fn create_popup(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(form_id): Path<String>,
    JsonBody(popup): JsonBody<Popup>,
) -> Result<(StatusCode, Json<PopupCreated>), AppError> {
    let mut form = owned_form(&state, auth, &form_id).await?;

    if form.popups.iter().any(|p| p.id == popup.id) {
        return Err(AppError::Validation(format!(
            "Popup {} already exists in this form",
            popup.id
        )));
    }

    form.popups.push(popup.clone());
    state.store.update_form(&form).await?;

    Ok((
        StatusCode::CREATED,
        Json(PopupCreated {
            message: "Popup created successfully".to_string(),
            popup,
        }),
    ))
}

/// GET /Form/:formId/Popups - The snapshot a client sends to `POST /chat`
pub async fn list_popups(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<PopupsResponse>, AppError> {
    let form = owned_form(&state, auth, &form_id).await?;
    Ok(Json(PopupsResponse { popups: form.popups }))
}

/// DELETE /Form/:formId/Popup/:popupId
pub async fn delete_popup(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((form_id, popup_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    let popup_id = parse_popup_id(&popup_id)?;
    let mut form = owned_form(&state, auth, &form_id).await?;

    form.popups.retain(|p| p.id != popup_id);
    state.store.update_form(&form).await?;

    Ok(MessageResponse::new("Popup deleted successfully"))
}

/// PATCH /Form/:formId/Popup/:popupId - Replace a popup's content
pub async fn update_popup_content(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((form_id, popup_id)): Path<(String, String)>,
    JsonBody(payload): JsonBody<UpdatePopupRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let popup_id = parse_popup_id(&popup_id)?;
    let mut form = owned_form(&state, auth, &form_id).await?;

    let popup = form
        .popups
        .iter_mut()
        .find(|p| p.id == popup_id)
        .ok_or(AppError::NotFound("Popup not found"))?;
    popup.content = payload.content;

    state.store.update_form(&form).await?;
    Ok(MessageResponse::new("Popup content updated successfully"))
}
