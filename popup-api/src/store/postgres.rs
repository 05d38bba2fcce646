use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{CounterUpdate, Store};
use crate::error::StoreError;
use crate::types::{Chat, Folder, Form, Popup, ResponseEntry, User};

/// Postgres-backed store. Embedded documents (popups, responses) live in
/// `jsonb` columns of their owning row.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;

        info!("Database migrations applied");
        Ok(Self { pool })
    }
}

// ==================== Rows ====================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct FolderRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<FolderRow> for Folder {
    fn from(row: FolderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct FormRow {
    id: Uuid,
    user_id: Uuid,
    folder_id: Option<Uuid>,
    name: String,
    popups: Json<Vec<Popup>>,
    created_at: DateTime<Utc>,
}

impl From<FormRow> for Form {
    fn from(row: FormRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            folder_id: row.folder_id,
            name: row.name,
            popups: row.popups.0,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChatRow {
    id: Uuid,
    popups: Json<Vec<Popup>>,
    responses: Json<BTreeMap<usize, ResponseEntry>>,
    views: i64,
    incomplete_interactions: i64,
    completion_rate: i32,
    last_visited: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Self {
            id: row.id,
            popups: row.popups.0,
            responses: row.responses.0,
            views: row.views,
            incomplete_interactions: row.incomplete_interactions,
            completion_rate: row.completion_rate,
            last_visited: row.last_visited,
            created_at: row.created_at,
        }
    }
}

const FORM_COLUMNS: &str = "id, user_id, folder_id, name, popups, created_at";
const CHAT_COLUMNS: &str =
    "id, popups, responses, views, incomplete_interactions, completion_rate, last_visited, created_at";

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET username = $2, email = $3, password_hash = $4 WHERE id = $1")
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn insert_folder(&self, folder: &Folder) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO folders (id, user_id, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(folder.id)
            .bind(folder.user_id)
            .bind(&folder.name)
            .bind(folder.created_at)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_folder(&self, id: Uuid) -> Result<Option<Folder>, StoreError> {
        let row = sqlx::query_as::<_, FolderRow>("SELECT * FROM folders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Folder::from))
    }

    async fn find_folder_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Folder>, StoreError> {
        let row = sqlx::query_as::<_, FolderRow>("SELECT * FROM folders WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Folder::from))
    }

    async fn list_folders(&self, user_id: Uuid) -> Result<Vec<Folder>, StoreError> {
        let rows = sqlx::query_as::<_, FolderRow>(
            "SELECT * FROM folders WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Folder::from).collect())
    }

    async fn delete_folder(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM folders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_form(&self, form: &Form) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO forms (id, user_id, folder_id, name, popups, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(form.id)
        .bind(form.user_id)
        .bind(form.folder_id)
        .bind(&form.name)
        .bind(Json(&form.popups))
        .bind(form.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_form(&self, id: Uuid) -> Result<Option<Form>, StoreError> {
        let row = sqlx::query_as::<_, FormRow>(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Form::from))
    }

    async fn list_forms(&self, user_id: Uuid, folder_id: Option<Uuid>) -> Result<Vec<Form>, StoreError> {
        let rows = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {FORM_COLUMNS} FROM forms WHERE user_id = $1 AND ($2::uuid IS NULL OR folder_id = $2) ORDER BY created_at"
        ))
        .bind(user_id)
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Form::from).collect())
    }

    async fn update_form(&self, form: &Form) -> Result<(), StoreError> {
        sqlx::query("UPDATE forms SET name = $2, folder_id = $3, popups = $4 WHERE id = $1")
            .bind(form.id)
            .bind(&form.name)
            .bind(form.folder_id)
            .bind(Json(&form.popups))
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn delete_form(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM forms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chats (id, popups, responses, views, incomplete_interactions, completion_rate, last_visited, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(chat.id)
        .bind(Json(&chat.popups))
        .bind(Json(&chat.responses))
        .bind(chat.views)
        .bind(chat.incomplete_interactions)
        .bind(chat.completion_rate)
        .bind(chat.last_visited)
        .bind(chat.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError> {
        let row = sqlx::query_as::<_, ChatRow>(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Chat::from))
    }

    async fn touch_chat(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE chats SET last_visited = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_chat_response(&self, id: Uuid, index: usize, entry: &ResponseEntry) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE chats SET responses = jsonb_set(responses, ARRAY[$2::text], $3) WHERE id = $1",
        )
        .bind(id)
        .bind(index.to_string())
        .bind(Json(entry))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_chat_counters(&self, id: Uuid, apply: CounterUpdate<'_>) -> Result<Option<Chat>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock: response writes to this chat wait until commit
        let row = sqlx::query_as::<_, ChatRow>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut chat = Chat::from(row);
        apply(&mut chat);

        sqlx::query(
            "UPDATE chats SET views = $2, incomplete_interactions = $3, completion_rate = $4 WHERE id = $1",
        )
        .bind(chat.id)
        .bind(chat.views)
        .bind(chat.incomplete_interactions)
        .bind(chat.completion_rate)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(chat))
    }
}
