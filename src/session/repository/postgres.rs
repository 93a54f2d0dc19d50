use async_trait::async_trait;
use sqlx::PgPool;

use super::{RepositoryError, UserRepository};
use crate::session::model::User;

/// Read-only view of the `users` table (`user_id`, `nickname`).
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
    query: String,
}

impl PgUserRepository {
    pub fn new(pool: PgPool, table: &str) -> Self {
        let query = format!("SELECT user_id, nickname FROM {} WHERE user_id = $1", table);
        Self { pool, query }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&self.query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        if user.is_none() {
            tracing::debug!("User {} not found", id);
        }
        Ok(user)
    }
}
