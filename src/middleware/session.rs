use std::sync::Arc;

use async_trait::async_trait;

use super::Middleware;
use crate::error::AppError;
use crate::server::WebServer;
use crate::session::{
    BridgeSettings, RepositoryBridge, SessionBridge, SessionState, session_middleware,
};

/// Installs the server's session bridge and the per-request session stage.
pub struct SessionMiddleware;

impl SessionMiddleware {
    fn build_bridge(server: &WebServer, secret: &str) -> Result<Arc<dyn SessionBridge>, AppError> {
        let config = &server.config.session;
        let services = &server.services;

        match config.bridge.as_str() {
            "repository" => {
                let mut bridge = RepositoryBridge::new(secret, BridgeSettings::from(config))
                    .with_geo(services.geo());

                // A missing repository is reported again on every session
                // creation; the server still starts.
                match services.session_repository(&config.session_repository, &config.model) {
                    Some(repository) => bridge = bridge.with_sessions(repository),
                    None => tracing::error!(
                        "Server {} has no usable session repository ({})",
                        server.name(),
                        config.session_repository
                    ),
                }
                match services.user_repository(&config.user_repository) {
                    Some(repository) => bridge = bridge.with_users(repository),
                    None => tracing::error!(
                        "Server {} has no usable user repository ({})",
                        server.name(),
                        config.user_repository
                    ),
                }

                Ok(Arc::new(bridge))
            }
            other => Err(AppError::Middleware {
                name: "session".into(),
                server: server.name().to_string(),
                reason: format!("unknown session bridge {}", other),
            }),
        }
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    fn name(&self) -> &str {
        "session"
    }

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError> {
        let Some(secret) = server.config.session.secret.clone() else {
            return Err(AppError::Middleware {
                name: "session".into(),
                server: server.name().to_string(),
                reason: "SESSION_SECRET is not set".into(),
            });
        };

        let bridge = Self::build_bridge(server, &secret)?;
        server.services.bridges.install(server.name(), bridge.clone());

        let state = SessionState {
            server: server.name().to_string(),
            bridge,
            cookie: server.config.session.cookie.clone(),
            ip_header: server.config.session.ip_header.clone(),
        };
        server.add_stage("session", move |router| {
            router.layer(axum::middleware::from_fn_with_state(
                state.clone(),
                session_middleware,
            ))
        });
        Ok(())
    }

    async fn unregister(&self, server: &mut WebServer) -> Result<(), AppError> {
        server.remove_stage("session");
        server.services.bridges.remove(server.name());
        Ok(())
    }
}
