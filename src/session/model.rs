use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::utils::sha256_hex;

/// Application-defined session data.
pub type Payload = Map<String, Value>;

/// User entity owned by a [`UserRepository`](super::UserRepository).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    #[sqlx(rename = "user_id")]
    pub id: String,
    pub nickname: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nickname: None,
        }
    }
}

/// Request metadata snapshot kept with a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub ip: Option<String>,
    pub forwarded_for: Option<String>,
    pub user_agent: Option<String>,
    pub geo: Option<Value>,
}

/// Persisted shape of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub payload: Payload,
    pub user_id: Option<String>,
    pub info: SessionInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub payload: Payload,
    pub user: Option<User>,
    pub info: SessionInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Content digest as last read from or written to storage.
    pub(crate) stored_digest: Option<String>,
}

impl Session {
    pub fn new(token: String, user: Option<User>, info: SessionInfo) -> Self {
        let now = Utc::now();
        Self {
            token,
            payload: Payload::new(),
            user,
            info,
            created_at: now,
            updated_at: now,
            stored_digest: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    /// True when the session carries data worth keeping.
    pub fn is_valid(&self) -> bool {
        !self.payload.is_empty() || self.user.is_some()
    }

    pub fn is_persisted(&self) -> bool {
        self.stored_digest.is_some()
    }

    pub(crate) fn digest(&self) -> String {
        content_digest(&self.payload, self.user_id())
    }

    /// A stored user id that no longer resolves leaves `user` empty, so the
    /// next save sees a changed digest and drops the dangling id.
    pub(crate) fn from_record(record: SessionRecord, user: Option<User>) -> Self {
        let stored_digest = content_digest(&record.payload, record.user_id.as_deref());
        Self {
            token: record.token,
            payload: record.payload,
            user,
            info: record.info,
            created_at: record.created_at,
            updated_at: record.updated_at,
            stored_digest: Some(stored_digest),
        }
    }

    pub(crate) fn to_record(&self) -> SessionRecord {
        SessionRecord {
            token: self.token.clone(),
            payload: self.payload.clone(),
            user_id: self.user_id().map(str::to_string),
            info: self.info.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn content_digest(payload: &Payload, user_id: Option<&str>) -> String {
    let content = serde_json::json!({
        "payload": payload,
        "user_id": user_id,
    });
    sha256_hex(content.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_anonymous_session_is_not_valid() {
        let session = Session::new("t".into(), None, SessionInfo::default());
        assert!(!session.is_valid());
        assert!(!session.is_persisted());
    }

    #[test]
    fn payload_or_user_makes_a_session_valid() {
        let mut session = Session::new("t".into(), None, SessionInfo::default());
        session.payload.insert("cart".into(), Value::from(3));
        assert!(session.is_valid());

        let session = Session::new("t".into(), Some(User::new("u1")), SessionInfo::default());
        assert!(session.is_valid());
    }

    #[test]
    fn digest_tracks_payload_and_user() {
        let mut session = Session::new("t".into(), None, SessionInfo::default());
        let before = session.digest();
        session.payload.insert("k".into(), Value::from("v"));
        assert_ne!(before, session.digest());

        let with_payload = session.digest();
        session.user = Some(User::new("u1"));
        assert_ne!(with_payload, session.digest());
    }
}
