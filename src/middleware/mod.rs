//! Named, shareable middleware and the registry that hands them out.
//!
//! Every middleware registers against a [`WebServer`] at `init` and may clean
//! up at `stop`. One instance serves every server that lists its name, so
//! per-server state is keyed by server name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::AppError;
use crate::server::WebServer;

mod cors;
mod error_handler;
mod logger;
mod parser;
mod routes;
mod session;
mod statics;

pub use cors::CorsMiddleware;
pub use error_handler::log_errors;
pub use logger::LoggerMiddleware;
pub use parser::ParserMiddleware;
pub use routes::{RouteProvider, RoutesMiddleware};
pub use session::SessionMiddleware;
pub use statics::StaticMiddleware;

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError>;

    /// Nothing to clean up by default.
    async fn unregister(&self, _server: &mut WebServer) -> Result<(), AppError> {
        Ok(())
    }
}

type Factory = Box<dyn Fn() -> Arc<dyn Middleware> + Send + Sync>;

/// Maps middleware names to factories and caches the instance built for
/// each name.
#[derive(Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, Factory>,
    instances: Mutex<HashMap<String, Arc<dyn Middleware>>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in middleware and the given route providers.
    pub fn with_defaults(providers: Vec<RouteProvider>) -> Self {
        let mut registry = Self::new();
        registry.define("logger", || Arc::new(LoggerMiddleware::new()));
        registry.define("cors", || Arc::new(CorsMiddleware));
        registry.define("parser", || Arc::new(ParserMiddleware));
        registry.define("static", || Arc::new(StaticMiddleware));
        registry.define("session", || Arc::new(SessionMiddleware));
        registry.define("routes", move || Arc::new(RoutesMiddleware::new(providers.clone())));
        registry
    }

    /// Replaces any factory already defined under `name`.
    pub fn define<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Middleware> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Middleware>, AppError> {
        let mut instances = self
            .instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(instance) = instances.get(name) {
            return Ok(instance.clone());
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AppError::UnknownMiddleware(name.to_string()))?;
        let instance = factory();
        instances.insert(name.to_string(), instance.clone());
        Ok(instance)
    }
}
