use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{RepositoryError, SessionRepository, UserRepository};
use crate::session::model::{SessionRecord, User};

/// Process-local session storage, keyed by token.
#[derive(Debug)]
pub struct MemorySessionRepository {
    model: String,
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionRepository {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemorySessionRepository {
    fn default() -> Self {
        Self::new("sessions")
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    fn model(&self) -> &str {
        &self.model
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        Ok(self.records.read().await.get(token).cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        self.records
            .write()
            .await
            .insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), RepositoryError> {
        self.records.write().await.remove(token);
        Ok(())
    }

    async fn delete_expired(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.updated_at >= older_than);
        Ok((before - records.len()) as u64)
    }
}

/// Process-local user directory.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn remove(&self, id: &str) -> Option<User> {
        self.users.write().await.remove(id)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(id).cloned())
    }
}
