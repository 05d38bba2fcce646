use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CounterUpdate, Store};
use crate::error::StoreError;
use crate::types::{Chat, Folder, Form, ResponseEntry, User};

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    folders: RwLock<HashMap<Uuid, Folder>>,
    forms: RwLock<HashMap<Uuid, Form>>,
    chats: RwLock<HashMap<Uuid, Chat>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Another form of the same owner already uses this name in this folder
fn name_taken(forms: &HashMap<Uuid, Form>, form: &Form) -> bool {
    forms.values().any(|f| {
        f.id != form.id && f.user_id == form.user_id && f.folder_id == form.folder_id && f.name == form.name
    })
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(StoreError::Duplicate);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn insert_folder(&self, folder: &Folder) -> Result<(), StoreError> {
        let mut folders = self.folders.write().await;
        if folders
            .values()
            .any(|f| f.user_id == folder.user_id && f.name == folder.name)
        {
            return Err(StoreError::Duplicate);
        }
        folders.insert(folder.id, folder.clone());
        Ok(())
    }

    async fn find_folder(&self, id: Uuid) -> Result<Option<Folder>, StoreError> {
        Ok(self.folders.read().await.get(&id).cloned())
    }

    async fn find_folder_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Folder>, StoreError> {
        Ok(self
            .folders
            .read()
            .await
            .values()
            .find(|f| f.user_id == user_id && f.name == name)
            .cloned())
    }

    async fn list_folders(&self, user_id: Uuid) -> Result<Vec<Folder>, StoreError> {
        let mut folders: Vec<Folder> = self
            .folders
            .read()
            .await
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        folders.sort_by_key(|f| f.created_at);
        Ok(folders)
    }

    async fn delete_folder(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.folders.write().await.remove(&id).is_some())
    }

    async fn insert_form(&self, form: &Form) -> Result<(), StoreError> {
        let mut forms = self.forms.write().await;
        if name_taken(&forms, form) {
            return Err(StoreError::Duplicate);
        }
        forms.insert(form.id, form.clone());
        Ok(())
    }

    async fn find_form(&self, id: Uuid) -> Result<Option<Form>, StoreError> {
        Ok(self.forms.read().await.get(&id).cloned())
    }

    async fn list_forms(&self, user_id: Uuid, folder_id: Option<Uuid>) -> Result<Vec<Form>, StoreError> {
        let mut forms: Vec<Form> = self
            .forms
            .read()
            .await
            .values()
            .filter(|f| f.user_id == user_id)
            .filter(|f| folder_id.map_or(true, |id| f.folder_id == Some(id)))
            .cloned()
            .collect();
        forms.sort_by_key(|f| f.created_at);
        Ok(forms)
    }

    async fn update_form(&self, form: &Form) -> Result<(), StoreError> {
        let mut forms = self.forms.write().await;
        if name_taken(&forms, form) {
            return Err(StoreError::Duplicate);
        }
        forms.insert(form.id, form.clone());
        Ok(())
    }

    async fn delete_form(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.forms.write().await.remove(&id).is_some())
    }

    async fn insert_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        self.chats.write().await.insert(chat.id, chat.clone());
        Ok(())
    }

    async fn find_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError> {
        Ok(self.chats.read().await.get(&id).cloned())
    }

    async fn touch_chat(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(match self.chats.write().await.get_mut(&id) {
            Some(chat) => {
                chat.touch(now);
                true
            }
            None => false,
        })
    }

    async fn set_chat_response(&self, id: Uuid, index: usize, entry: &ResponseEntry) -> Result<bool, StoreError> {
        Ok(match self.chats.write().await.get_mut(&id) {
            Some(chat) => {
                chat.responses.insert(index, entry.clone());
                true
            }
            None => false,
        })
    }

    async fn update_chat_counters(&self, id: Uuid, apply: CounterUpdate<'_>) -> Result<Option<Chat>, StoreError> {
        let mut chats = self.chats.write().await;
        let Some(chat) = chats.get_mut(&id) else {
            return Ok(None);
        };

        // Only the counters leave the closure's copy
        let mut working = chat.clone();
        apply(&mut working);
        chat.views = working.views;
        chat.incomplete_interactions = working.incomplete_interactions;
        chat.completion_rate = working.completion_rate;

        Ok(Some(chat.clone()))
    }
}
