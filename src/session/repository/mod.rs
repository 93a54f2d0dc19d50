//! Storage seams of the session bridge.
//!
//! The bridge never locks around these calls: adapters must tolerate
//! interleaved reads and writes from concurrent requests, and the last write
//! for a token wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::model::{SessionRecord, User};

mod memory;
mod postgres;
mod redis_store;

pub use self::memory::{MemorySessionRepository, MemoryUserRepository};
pub use self::postgres::PgUserRepository;
pub use self::redis_store::RedisSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Storage namespace the records live under.
    fn model(&self) -> &str;

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>, RepositoryError>;

    async fn save(&self, record: &SessionRecord) -> Result<(), RepositoryError>;

    /// Deleting an absent record succeeds.
    async fn delete(&self, token: &str) -> Result<(), RepositoryError>;

    /// Removes records last updated before `older_than` and returns how many
    /// were removed. Adapters without bulk expiry keep the default.
    async fn delete_expired(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let _ = older_than;
        Ok(0)
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<User>, RepositoryError>;
}
