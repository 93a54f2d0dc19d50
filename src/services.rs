use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use redis::Client as RedisClient;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;
use crate::error::AppError;
use crate::session::{
    BridgeRegistry, GeoLocator, HttpGeoLocator, MemorySessionRepository, MemoryUserRepository,
    PgUserRepository, RedisSessionRepository, SessionRepository, UserRepository,
};

/// Process-wide collaborators, built once at startup and shared by every
/// server. Repositories are resolved by their configured name; asking for
/// the same name (and model) twice yields the same instance.
pub struct Services {
    pub project_name: String,
    pub bridges: Arc<BridgeRegistry>,
    pub memory_users: Arc<MemoryUserRepository>,
    redis: Option<Arc<RedisClient>>,
    pool: Option<PgPool>,
    user_table: String,
    geo: Option<Arc<dyn GeoLocator>>,
    session_repositories: Mutex<HashMap<(String, String), Arc<dyn SessionRepository>>>,
}

impl Services {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            bridges: Arc::new(BridgeRegistry::new()),
            memory_users: Arc::new(MemoryUserRepository::new()),
            redis: None,
            pool: None,
            user_table: "users".into(),
            geo: None,
            session_repositories: Mutex::new(HashMap::new()),
        }
    }

    /// Connections are opened lazily, so an unreachable store surfaces as a
    /// repository error on the first request rather than at startup.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let mut services = Self::new(config.project_name.clone());
        services.user_table = config.user_table.clone();

        if let Some(url) = &config.redis_url {
            let client = RedisClient::open(url.as_str()).map_err(|e| AppError::Backend {
                name: "redis".into(),
                reason: e.to_string(),
            })?;
            services.redis = Some(Arc::new(client));
        }

        if let Some(url) = &config.database_url {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect_lazy(url)
                .map_err(|e| AppError::Backend {
                    name: "postgres".into(),
                    reason: e.to_string(),
                })?;
            services.pool = Some(pool);
        }

        if let Some(url) = &config.geoip_url {
            match HttpGeoLocator::new(url.clone()) {
                Ok(locator) => services.geo = Some(Arc::new(locator)),
                Err(e) => tracing::warn!("Geo lookup disabled: {}", e),
            }
        }

        Ok(services)
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoLocator>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn geo(&self) -> Option<Arc<dyn GeoLocator>> {
        self.geo.clone()
    }

    pub fn session_repository(&self, name: &str, model: &str) -> Option<Arc<dyn SessionRepository>> {
        let key = (name.to_string(), model.to_string());
        let mut cache = self
            .session_repositories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(repository) = cache.get(&key) {
            return Some(repository.clone());
        }

        let repository: Arc<dyn SessionRepository> = match name {
            "memory" => Arc::new(MemorySessionRepository::new(model)),
            "redis" => match &self.redis {
                Some(client) => Arc::new(RedisSessionRepository::new(client.clone(), model)),
                None => {
                    tracing::warn!("Session repository redis requested but REDIS_URL is not set");
                    return None;
                }
            },
            other => {
                tracing::warn!("Unknown session repository: {}", other);
                return None;
            }
        };
        cache.insert(key, repository.clone());
        Some(repository)
    }

    pub fn user_repository(&self, name: &str) -> Option<Arc<dyn UserRepository>> {
        match name {
            "memory" => Some(self.memory_users.clone()),
            "postgres" => match &self.pool {
                Some(pool) => Some(Arc::new(PgUserRepository::new(pool.clone(), &self.user_table))),
                None => {
                    tracing::warn!("User repository postgres requested but DATABASE_URL is not set");
                    None
                }
            },
            other => {
                tracing::warn!("Unknown user repository: {}", other);
                None
            }
        }
    }
}
