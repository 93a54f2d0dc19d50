use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{body::Body, http::Request};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::{Middleware, log_errors};
use crate::error::AppError;
use crate::server::{ServerEvent, SubscriptionId, WebServer, events::CONNECTION};

/// Request spans, 5xx body logging and connection logging.
#[derive(Default)]
pub struct LoggerMiddleware {
    subscriptions: Mutex<HashMap<String, SubscriptionId>>,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubscriptionId>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    fn name(&self) -> &str {
        "logger"
    }

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError> {
        server.add_stage("logger", |router| {
            router.layer(axum::middleware::from_fn(log_errors)).layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        id = %Uuid::new_v4(),
                        method = %req.method(),
                        uri = %req.uri(),
                    )
                }),
            )
        });

        let (id, _) = server.events.subscribe(
            CONNECTION,
            Arc::new(|event: &ServerEvent| {
                if let Some(peer) = event.peer {
                    tracing::debug!("Server {} accepted connection from {}", event.server, peer);
                }
            }),
        );
        self.subscriptions().insert(server.name().to_string(), id);
        Ok(())
    }

    async fn unregister(&self, server: &mut WebServer) -> Result<(), AppError> {
        server.remove_stage("logger");
        let id = self.subscriptions().remove(server.name());
        if let Some(id) = id {
            server.events.unsubscribe(CONNECTION, id);
        }
        Ok(())
    }
}
