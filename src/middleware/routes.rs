use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::Middleware;
use crate::error::AppError;
use crate::server::{RouteModule, WebServer};

/// Builds one route module for a server.
pub type RouteProvider = fn(&WebServer) -> RouteModule;

/// Mounts the route modules of every provider.
pub struct RoutesMiddleware {
    providers: Vec<RouteProvider>,
    mounted: Mutex<HashMap<String, Vec<String>>>,
}

impl RoutesMiddleware {
    pub fn new(providers: Vec<RouteProvider>) -> Self {
        Self {
            providers,
            mounted: Mutex::new(HashMap::new()),
        }
    }

    fn mounted(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.mounted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Middleware for RoutesMiddleware {
    fn name(&self) -> &str {
        "routes"
    }

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError> {
        let mut names = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let module = provider(server);
            tracing::debug!(
                "Mounting routes {} (priority {}) on server {}",
                module.name,
                module.priority,
                server.name()
            );
            names.push(module.name.clone());
            server.mount(module);
        }
        self.mounted().insert(server.name().to_string(), names);
        Ok(())
    }

    async fn unregister(&self, server: &mut WebServer) -> Result<(), AppError> {
        let names = self.mounted().remove(server.name()).unwrap_or_default();
        for name in names {
            server.unmount(&name);
        }
        Ok(())
    }
}
