//! Chat session endpoints. None of them require authentication: any caller
//! holding a chat id can read or update that chat.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{parse_id, JsonBody, MessageResponse};
use crate::chat::{invalid_popup_index, ChatReport, InteractionUpdate};
use crate::error::AppError;
use crate::state::AppState;
use crate::types::{Chat, Popup};

const INVALID_CHAT_ID: &str = "Invalid chat ID";

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub popups: Option<Vec<Popup>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    pub chat_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub chat_id: Uuid,
    pub popups: Vec<Popup>,
}

#[derive(Debug, Deserialize)]
pub struct SaveResponseRequest {
    /// Checked by hand so a missing or non-integer index reads as a bad index
    pub index: Option<serde_json::Value>,
    #[serde(default)]
    pub response: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub message: String,
    pub chat: Chat,
}

async fn load_chat(state: &AppState, raw_id: &str) -> Result<Chat, AppError> {
    let id = parse_id(raw_id, INVALID_CHAT_ID)?;
    state
        .store
        .find_chat(id)
        .await?
        .ok_or(AppError::NotFound("Chat not found"))
}

/// POST /chat - Start a chat from a snapshot of a form's popups
pub async fn create_chat(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateChatRequest>,
) -> Result<(StatusCode, Json<CreateChatResponse>), AppError> {
    let popups = payload
        .popups
        .ok_or_else(|| AppError::Validation("popups is required".to_string()))?;

    let chat = Chat::new(popups, Utc::now());
    state.store.insert_chat(&chat).await?;

    info!("Created chat {} with {} popups", chat.id, chat.popups.len());
    Ok((StatusCode::CREATED, Json(CreateChatResponse { chat_id: chat.id })))
}

/// GET /chat/:id - Popups of a chat; marks the chat as visited
pub async fn get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatResponse>, AppError> {
    let chat = load_chat(&state, &id).await?;

    if !state.store.touch_chat(chat.id, Utc::now()).await? {
        return Err(AppError::NotFound("Chat not found"));
    }

    Ok(Json(ChatResponse {
        chat_id: chat.id,
        popups: chat.popups,
    }))
}

/// POST /chat/:id/response - Record the answer to the popup at `index`
pub async fn save_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<SaveResponseRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let chat = load_chat(&state, &id).await?;

    let index = payload
        .index
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(invalid_popup_index)?;
    let (position, entry) = chat.response_entry(index, payload.response, Utc::now())?;

    if !state.store.set_chat_response(chat.id, position, &entry).await? {
        return Err(AppError::NotFound("Chat not found"));
    }

    debug!("Chat {} answered popup {}", chat.id, position);
    Ok(MessageResponse::new("Response saved"))
}

/// GET /formresponse/:id - Engagement counters and responses of a chat
pub async fn get_form_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatReport>, AppError> {
    let chat = load_chat(&state, &id).await?;
    Ok(Json(chat.report()))
}

/// PUT /chat/:id/interact - Apply counter deltas and recompute completion.
/// An empty body only recomputes.
pub async fn update_interaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<InteractionUpdate>,
) -> Result<Json<InteractionResponse>, AppError> {
    let id = parse_id(&id, INVALID_CHAT_ID)?;

    let chat = state
        .store
        .update_chat_counters(id, &|chat: &mut Chat| chat.apply_interaction(&update))
        .await?
        .ok_or(AppError::NotFound("Chat not found"))?;

    debug!(
        "Chat {} interaction: views={} incomplete={} completion={}",
        chat.id, chat.views, chat.incomplete_interactions, chat.completion_rate
    );
    Ok(Json(InteractionResponse {
        message: "Chat interaction updated successfully".to_string(),
        chat,
    }))
}
