//! Documents persisted by the store

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single interactive prompt embedded in a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Popup {
    /// Caller-assigned, unique within a form
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    /// Usually a media URL
    #[serde(default)]
    pub content: String,
    pub serial_no: i64,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// User as returned to clients (no password hash)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: Uuid,
    pub user_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub name: String,
    pub popups: Vec<Popup>,
    pub created_at: DateTime<Utc>,
}

/// A recorded answer to one popup of a chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub popup_type: Option<String>,
    pub serial_no: i64,
    pub response: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

/// A runtime instance of a form presented to one visitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    /// Snapshot taken at creation; later form edits do not reach it
    pub popups: Vec<Popup>,
    /// Keyed by popup position, sparse
    pub responses: BTreeMap<usize, ResponseEntry>,
    pub views: i64,
    pub incomplete_interactions: i64,
    pub completion_rate: i32,
    pub last_visited: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
