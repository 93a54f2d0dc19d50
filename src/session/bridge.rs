use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use super::meta::{self, GeoLocator, RequestMeta};
use super::model::{Session, SessionInfo, User};
use super::repository::{RepositoryError, SessionRepository, UserRepository};
use super::token::TokenCodec;
use crate::config::SessionConfig;
use crate::utils::random_token;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session bridge misconfigured: {0}")]
    Configuration(String),

    #[error("invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Binding between the session middleware and a concrete storage and token
/// strategy.
#[async_trait]
pub trait SessionBridge: Send + Sync {
    async fn create(&self, user: Option<User>, meta: &RequestMeta) -> Result<Session, BridgeError>;

    async fn find(&self, token: &str, meta: &RequestMeta) -> Result<Option<Session>, BridgeError>;

    async fn save(&self, session: &mut Session, meta: &RequestMeta) -> Result<(), BridgeError>;

    async fn destroy(&self, session: &Session) -> Result<(), BridgeError>;

    /// Returns the number of removed sessions.
    async fn expire(&self) -> Result<u64, BridgeError>;

    fn encode_token(&self, session: &Session) -> Result<String, BridgeError>;

    /// `Err` for a token that fails verification, `Ok(None)` for a genuine
    /// token whose session is gone.
    async fn decode_token(
        &self,
        token: &str,
        meta: &RequestMeta,
    ) -> Result<Option<Session>, BridgeError>;

    fn is_valid(&self, session: &Session) -> bool {
        session.is_valid()
    }

    /// Zero disables the periodic sweep.
    fn expire_interval(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub save_interval: Duration,
    pub expire_timeout: Duration,
    pub expire_interval: Duration,
    pub token_length: usize,
    pub token_alphabet: String,
}

impl From<&SessionConfig> for BridgeSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            save_interval: config.save_interval(),
            expire_timeout: config.expire_timeout(),
            expire_interval: config.expire_interval(),
            token_length: config.token_length,
            token_alphabet: config.token_alphabet.clone(),
        }
    }
}

/// Bridge backed by a [`SessionRepository`] and a [`UserRepository`].
pub struct RepositoryBridge {
    sessions: Option<Arc<dyn SessionRepository>>,
    users: Option<Arc<dyn UserRepository>>,
    geo: Option<Arc<dyn GeoLocator>>,
    codec: TokenCodec,
    settings: BridgeSettings,
}

impl RepositoryBridge {
    pub fn new(secret: &str, settings: BridgeSettings) -> Self {
        Self {
            sessions: None,
            users: None,
            geo: None,
            codec: TokenCodec::new(secret),
            settings,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionRepository>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_users(mut self, users: Arc<dyn UserRepository>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_geo(mut self, geo: Option<Arc<dyn GeoLocator>>) -> Self {
        self.geo = geo;
        self
    }

    fn sessions(&self) -> Result<&Arc<dyn SessionRepository>, BridgeError> {
        self.sessions
            .as_ref()
            .ok_or_else(|| BridgeError::Configuration("no session repository".into()))
    }

    async fn snapshot(&self, previous: &SessionInfo, meta: &RequestMeta) -> SessionInfo {
        meta::snapshot(previous, meta, self.geo.as_deref()).await
    }

    async fn resolve_user(&self, id: &str) -> Result<Option<User>, BridgeError> {
        match &self.users {
            Some(users) => Ok(users.find(id).await?),
            None => {
                tracing::warn!("Session references user {} but no user repository is configured", id);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl SessionBridge for RepositoryBridge {
    async fn create(&self, user: Option<User>, meta: &RequestMeta) -> Result<Session, BridgeError> {
        let repository = self.sessions()?;
        if repository.model().is_empty() {
            return Err(BridgeError::Configuration("session model is empty".into()));
        }

        let token = random_token(self.settings.token_length, &self.settings.token_alphabet);
        let info = self.snapshot(&SessionInfo::default(), meta).await;
        Ok(Session::new(token, user, info))
    }

    async fn find(&self, token: &str, meta: &RequestMeta) -> Result<Option<Session>, BridgeError> {
        let Some(record) = self.sessions()?.find_by_token(token).await? else {
            return Ok(None);
        };

        let user = match record.user_id.as_deref() {
            Some(id) => self.resolve_user(id).await?,
            None => None,
        };

        let mut session = Session::from_record(record, user);
        session.info = self.snapshot(&session.info, meta).await;
        Ok(Some(session))
    }

    async fn save(&self, session: &mut Session, meta: &RequestMeta) -> Result<(), BridgeError> {
        let repository = self.sessions()?;
        session.info = self.snapshot(&session.info, meta).await;

        if !session.is_persisted() && !session.is_valid() {
            return Ok(());
        }

        let digest = session.digest();
        let now = Utc::now();
        let age = (now - session.updated_at).to_std().unwrap_or_default();
        if session.stored_digest.as_deref() == Some(digest.as_str())
            && age < self.settings.save_interval
        {
            return Ok(());
        }

        session.updated_at = now;
        repository.save(&session.to_record()).await?;
        session.stored_digest = Some(digest);
        Ok(())
    }

    async fn destroy(&self, session: &Session) -> Result<(), BridgeError> {
        self.sessions()?.delete(&session.token).await?;
        Ok(())
    }

    async fn expire(&self) -> Result<u64, BridgeError> {
        let timeout = chrono::Duration::from_std(self.settings.expire_timeout)
            .map_err(|_| BridgeError::Configuration("expire timeout out of range".into()))?;
        let removed = self.sessions()?.delete_expired(Utc::now() - timeout).await?;
        Ok(removed)
    }

    fn encode_token(&self, session: &Session) -> Result<String, BridgeError> {
        Ok(self.codec.encode(&session.token)?)
    }

    async fn decode_token(
        &self,
        token: &str,
        meta: &RequestMeta,
    ) -> Result<Option<Session>, BridgeError> {
        let claims = self.codec.decode(token)?;
        self.find(&claims.sid, meta).await
    }

    fn expire_interval(&self) -> Duration {
        self.settings.expire_interval
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::session::repository::{MemorySessionRepository, MemoryUserRepository};

    fn settings() -> BridgeSettings {
        BridgeSettings::from(&SessionConfig::default())
    }

    async fn bridge() -> (RepositoryBridge, Arc<MemorySessionRepository>) {
        let sessions = Arc::new(MemorySessionRepository::default());
        let users = Arc::new(MemoryUserRepository::new());
        users.insert(User::new("u1")).await;
        let bridge = RepositoryBridge::new("secret", settings())
            .with_sessions(sessions.clone())
            .with_users(users);
        (bridge, sessions)
    }

    #[tokio::test]
    async fn create_uses_configured_token_shape() {
        let (bridge, _) = bridge().await;
        let session = bridge.create(None, &RequestMeta::default()).await.unwrap();
        assert_eq!(session.token.len(), 64);
        assert!(session.payload.is_empty());
        assert!(session.user.is_none());
    }

    #[tokio::test]
    async fn create_without_repository_is_a_configuration_error() {
        let bridge = RepositoryBridge::new("secret", settings());
        let err = bridge.create(None, &RequestMeta::default()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[tokio::test]
    async fn token_round_trip_resolves_session_and_user() {
        let (bridge, _) = bridge().await;
        let meta = RequestMeta::default();
        let mut session = bridge.create(Some(User::new("u1")), &meta).await.unwrap();
        bridge.save(&mut session, &meta).await.unwrap();

        let cookie = bridge.encode_token(&session).unwrap();
        let found = bridge.decode_token(&cookie, &meta).await.unwrap().unwrap();

        assert_eq!(found.token, session.token);
        assert_eq!(found.user_id(), Some("u1"));
    }

    #[tokio::test]
    async fn tampered_token_fails_instead_of_resolving() {
        let (bridge, _) = bridge().await;
        let meta = RequestMeta::default();
        let mut session = bridge.create(Some(User::new("u1")), &meta).await.unwrap();
        bridge.save(&mut session, &meta).await.unwrap();
        let cookie = bridge.encode_token(&session).unwrap();

        let at = cookie.find('.').unwrap() + 2;
        let mut bytes = cookie.into_bytes();
        bytes[at] = if bytes[at] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let err = bridge.decode_token(&tampered, &meta).await.unwrap_err();
        assert!(matches!(err, BridgeError::Token(_)));
    }

    #[tokio::test]
    async fn valid_token_for_a_deleted_session_is_not_found() {
        let (bridge, _) = bridge().await;
        let meta = RequestMeta::default();
        let mut session = bridge.create(Some(User::new("u1")), &meta).await.unwrap();
        bridge.save(&mut session, &meta).await.unwrap();
        let cookie = bridge.encode_token(&session).unwrap();

        bridge.destroy(&session).await.unwrap();
        bridge.destroy(&session).await.unwrap();

        assert!(bridge.decode_token(&cookie, &meta).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_new_sessions_are_not_written() {
        let (bridge, sessions) = bridge().await;
        let meta = RequestMeta::default();
        let mut session = bridge.create(None, &meta).await.unwrap();

        bridge.save(&mut session, &meta).await.unwrap();

        assert!(sessions.is_empty().await);
        assert!(!bridge.is_valid(&session));
    }

    #[tokio::test]
    async fn unchanged_saves_within_the_interval_are_coalesced() {
        let (bridge, sessions) = bridge().await;
        let meta = RequestMeta::default();
        let mut session = bridge.create(None, &meta).await.unwrap();
        session.payload.insert("n".into(), Value::from(1));
        bridge.save(&mut session, &meta).await.unwrap();
        let first_write = session.updated_at;

        bridge.save(&mut session, &meta).await.unwrap();
        assert_eq!(session.updated_at, first_write);

        session.payload.insert("n".into(), Value::from(2));
        bridge.save(&mut session, &meta).await.unwrap();
        let stored = sessions.find_by_token(&session.token).await.unwrap().unwrap();
        assert_eq!(stored.payload["n"], Value::from(2));
    }

    #[tokio::test]
    async fn dangling_user_ids_resolve_to_no_user() {
        let sessions = Arc::new(MemorySessionRepository::default());
        let users = Arc::new(MemoryUserRepository::new());
        users.insert(User::new("gone")).await;
        let bridge = RepositoryBridge::new("secret", settings())
            .with_sessions(sessions.clone())
            .with_users(users.clone());
        let meta = RequestMeta::default();

        let mut session = bridge.create(Some(User::new("gone")), &meta).await.unwrap();
        bridge.save(&mut session, &meta).await.unwrap();
        users.remove("gone").await;

        let found = bridge.find(&session.token, &meta).await.unwrap().unwrap();
        assert!(found.user.is_none());
    }

    #[tokio::test]
    async fn expire_removes_sessions_older_than_the_timeout() {
        let sessions = Arc::new(MemorySessionRepository::default());
        let bridge = RepositoryBridge::new(
            "secret",
            BridgeSettings {
                expire_timeout: Duration::from_secs(60),
                ..settings()
            },
        )
        .with_sessions(sessions.clone());
        let meta = RequestMeta::default();

        for (name, age) in [("recent", 30), ("old", 90)] {
            let mut session = bridge.create(None, &meta).await.unwrap();
            session.token = name.to_string();
            session.payload.insert("seed".into(), Value::from(true));
            let mut record = session.to_record();
            record.updated_at = Utc::now() - chrono::Duration::seconds(age);
            sessions.save(&record).await.unwrap();
        }

        assert_eq!(bridge.expire().await.unwrap(), 1);
        assert!(sessions.find_by_token("recent").await.unwrap().is_some());
        assert!(sessions.find_by_token("old").await.unwrap().is_none());
    }
}
