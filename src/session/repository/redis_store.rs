use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};

use super::{RepositoryError, SessionRepository};
use crate::session::model::SessionRecord;
use crate::utils::sha256_hex;

/// Deletes every record scored below `ARGV[1]` in the index `KEYS[1]`.
const SWEEP_SCRIPT: &str = r"
local keys = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, key in ipairs(keys) do
    redis.call('DEL', key)
    redis.call('ZREM', KEYS[1], key)
end
return #keys
";

/// Exclusive upper score bound; scores are whole seconds.
fn expiry_bound(older_than: DateTime<Utc>) -> String {
    format!("({}", older_than.timestamp())
}

/// Session storage in Redis.
///
/// Records are JSON strings under `<model>:<sha256(token)>` so raw tokens never
/// appear in key listings. The sorted set `<model>:updated` scores every key
/// by its last update time and drives the expiration sweep.
#[derive(Clone)]
pub struct RedisSessionRepository {
    redis: Arc<RedisClient>,
    model: String,
}

impl RedisSessionRepository {
    pub fn new(redis: Arc<RedisClient>, model: impl Into<String>) -> Self {
        Self {
            redis,
            model: model.into(),
        }
    }

    fn record_key(&self, token: &str) -> String {
        format!("{}:{}", self.model, sha256_hex(token.as_bytes()))
    }

    fn index_key(&self) -> String {
        format!("{}:updated", self.model)
    }
}

#[async_trait]
impl SessionRepository for RedisSessionRepository {
    fn model(&self) -> &str {
        &self.model
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let result: Option<String> = conn.get(self.record_key(token)).await?;
        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = self.record_key(&record.token);
        let json = serde_json::to_string(record)?;

        let _: () = redis::pipe()
            .atomic()
            .set(&key, json)
            .ignore()
            .zadd(self.index_key(), &key, record.updated_at.timestamp())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), RepositoryError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = self.record_key(token);
        let _: () = redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .zrem(self.index_key(), &key)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn delete_expired(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // Selection and deletion run as one script, so a save landing during
        // the sweep either precedes it (and survives) or follows it.
        let removed: u64 = redis::Script::new(SWEEP_SCRIPT)
            .key(self.index_key())
            .arg(expiry_bound(older_than))
            .invoke_async(&mut conn)
            .await?;

        if removed > 0 {
            tracing::debug!("Expired {} sessions from {}", removed, self.model);
        }
        Ok(removed)
    }
}
