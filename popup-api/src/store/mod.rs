//! Document persistence
//!
//! Handlers talk to a [`Store`] trait object. [`PgStore`] is the production
//! backend; [`MemoryStore`] keeps everything in process and backs the
//! database-less dev mode and the HTTP tests.
//!
//! Users, folders and forms are written as whole documents, so concurrent
//! edits of one of them are last-write-wins. Chat writes are targeted: each
//! touches only the fields it owns, so a visit, a recorded response and a
//! counter update never undo one another.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Chat, Folder, Form, ResponseEntry, User};

/// Counter adjustment applied to a locked chat
pub type CounterUpdate<'a> = &'a (dyn Fn(&mut Chat) + Send + Sync);

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the email is taken
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    async fn insert_folder(&self, folder: &Folder) -> Result<(), StoreError>;
    async fn find_folder(&self, id: Uuid) -> Result<Option<Folder>, StoreError>;
    async fn find_folder_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Folder>, StoreError>;
    async fn list_folders(&self, user_id: Uuid) -> Result<Vec<Folder>, StoreError>;
    /// Returns false if nothing was deleted
    async fn delete_folder(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the owner already has a form
    /// of that name in the same folder
    async fn insert_form(&self, form: &Form) -> Result<(), StoreError>;
    async fn find_form(&self, id: Uuid) -> Result<Option<Form>, StoreError>;
    /// All of a user's forms, or only those in `folder_id` when given
    async fn list_forms(&self, user_id: Uuid, folder_id: Option<Uuid>) -> Result<Vec<Form>, StoreError>;
    /// Replaces name, folder and popups. Same uniqueness rule as insert.
    async fn update_form(&self, form: &Form) -> Result<(), StoreError>;
    async fn delete_form(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_chat(&self, chat: &Chat) -> Result<(), StoreError>;
    async fn find_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError>;

    /// Set `last_visited`. Returns false if the chat does not exist.
    async fn touch_chat(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Write the response at one popup position, leaving the others alone.
    /// Returns false if the chat does not exist.
    async fn set_chat_response(&self, id: Uuid, index: usize, entry: &ResponseEntry) -> Result<bool, StoreError>;

    /// Run `apply` on the current chat while holding it exclusively, then
    /// persist `views`, `incomplete_interactions` and `completion_rate` only.
    async fn update_chat_counters(&self, id: Uuid, apply: CounterUpdate<'_>) -> Result<Option<Chat>, StoreError>;
}
