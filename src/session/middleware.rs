use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use super::bridge::{BridgeError, SessionBridge};
use super::context::SessionContext;
use super::meta::RequestMeta;
use super::model::Session;
use super::token::TOKEN_LIFETIME_DAYS;

#[derive(Clone)]
pub struct SessionState {
    pub server: String,
    pub bridge: Arc<dyn SessionBridge>,
    /// Cookie carrying the signed token; `None` disables issuance.
    pub cookie: Option<String>,
    pub ip_header: Option<String>,
}

impl SessionState {
    /// Decodes the inbound token and falls back to a fresh anonymous
    /// session. `None` means the request proceeds without a session.
    async fn resolve(&self, token: Option<&str>, meta: &RequestMeta) -> Option<Session> {
        if let Some(token) = token {
            match self.bridge.decode_token(token, meta).await {
                Ok(Some(session)) => return Some(session),
                Ok(None) => tracing::debug!("Session for presented token no longer exists"),
                Err(BridgeError::Token(e)) => tracing::debug!("Rejected session token: {}", e),
                Err(e) => {
                    tracing::error!("Session lookup failed on server {}: {}", self.server, e);
                    return None;
                }
            }
        }

        match self.bridge.create(None, meta).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!("Session creation failed on server {}: {}", self.server, e);
                None
            }
        }
    }

    /// Copies the request context back into the session, persists it and
    /// issues the cookie for valid sessions.
    async fn finalize(
        &self,
        session: Option<Session>,
        context: &SessionContext,
        meta: &RequestMeta,
        response: &mut Response,
    ) {
        let Some(mut session) = session else {
            return;
        };

        if context.is_destroyed().await {
            if let Err(e) = self.bridge.destroy(&session).await {
                tracing::error!("Failed to destroy session on server {}: {}", self.server, e);
            }
            if let Some(name) = &self.cookie {
                set_cookie(response, removal_cookie(name));
            }
            return;
        }

        let (payload, user) = context.snapshot().await;
        session.payload = payload;
        session.user = user;

        if let Err(e) = self.bridge.save(&mut session, meta).await {
            tracing::error!("Failed to save session on server {}: {}", self.server, e);
            return;
        }

        if !self.bridge.is_valid(&session) {
            return;
        }
        let Some(name) = &self.cookie else {
            return;
        };
        match self.bridge.encode_token(&session) {
            Ok(value) => set_cookie(response, session_cookie(name, value)),
            Err(e) => tracing::error!("Failed to encode session token: {}", e),
        }
    }
}

/// Resolves the session, exposes it to handlers through [`SessionContext`]
/// and finalizes it once the inner service has produced a response.
///
/// The inner service and the finalize step run in a detached task, so the
/// session is still persisted when the client goes away mid-request, and a
/// panicking handler becomes a 500 after its session has been finalized.
pub async fn session_middleware(
    State(state): State<SessionState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let meta = RequestMeta::from_request(&req, state.ip_header.as_deref());
    let presented = state.cookie.as_deref().and_then(|name| {
        CookieJar::from_headers(req.headers())
            .get(name)
            .map(|c| c.value().to_string())
    });

    let session = state.resolve(presented.as_deref(), &meta).await;
    let context = match &session {
        Some(s) => SessionContext::new(Some(s.token.clone()), s.payload.clone(), s.user.clone()),
        None => SessionContext::default(),
    };
    req.extensions_mut().insert(context.clone());

    let task = tokio::spawn(async move {
        let mut response = match tokio::spawn(next.run(req)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Request handler aborted: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
        state.finalize(session, &context, &meta, &mut response).await;
        response
    });

    match task.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Session finalize aborted: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn session_cookie(name: &str, value: String) -> Cookie<'static> {
    // Readable from client scripts on purpose.
    Cookie::build((name.to_string(), value))
        .path("/")
        .max_age(time::Duration::days(TOKEN_LIFETIME_DAYS))
        .http_only(false)
        .build()
}

fn removal_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), String::new()))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

fn set_cookie(response: &mut Response, cookie: Cookie<'static>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Invalid session cookie header: {}", e),
    }
}
