use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::Value;
use tokio::sync::Mutex;

use super::model::{Payload, User};

#[derive(Debug, Default)]
struct State {
    token: Option<String>,
    payload: Payload,
    user: Option<User>,
    destroyed: bool,
}

/// Request-scoped view of the session.
///
/// Always present on requests that went through the session middleware;
/// when no session could be resolved it starts empty with no user. Whatever
/// payload the handlers leave here replaces the stored payload when the
/// response completes.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<Mutex<State>>,
}

impl SessionContext {
    pub fn new(token: Option<String>, payload: Payload, user: Option<User>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                token,
                payload,
                user,
                destroyed: false,
            })),
        }
    }

    /// Token of the backing session, if one was resolved.
    pub async fn token(&self) -> Option<String> {
        self.inner.lock().await.token.clone()
    }

    pub async fn payload(&self) -> Payload {
        self.inner.lock().await.payload.clone()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.payload.get(key).cloned()
    }

    pub async fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.lock().await.payload.insert(key.into(), value)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.payload.remove(key)
    }

    pub async fn replace(&self, payload: Payload) {
        self.inner.lock().await.payload = payload;
    }

    pub async fn clear(&self) {
        self.inner.lock().await.payload.clear();
    }

    pub async fn user(&self) -> Option<User> {
        self.inner.lock().await.user.clone()
    }

    pub async fn set_user(&self, user: Option<User>) {
        self.inner.lock().await.user = user;
    }

    /// Clears the context and deletes the stored session when the response
    /// completes; the cookie is expired.
    pub async fn destroy(&self) {
        let mut state = self.inner.lock().await;
        state.payload.clear();
        state.user = None;
        state.destroyed = true;
    }

    pub async fn is_destroyed(&self) -> bool {
        self.inner.lock().await.destroyed
    }

    pub(crate) async fn snapshot(&self) -> (Payload, Option<User>) {
        let state = self.inner.lock().await;
        (state.payload.clone(), state.user.clone())
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Without the session middleware handlers get a detached, empty context.
        Ok(parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .unwrap_or_default())
    }
}
