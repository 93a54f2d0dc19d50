use std::sync::Arc;

use config::Config;
use error::AppError;
use futures_util::future::join_all;
use middleware::MiddlewareRegistry;
use server::Server;
use services::Services;

pub mod config;
pub mod error;
pub mod middleware;
pub mod result;
pub mod routes;
pub mod server;
pub mod services;
pub mod session;
pub mod utils;

/// Every configured server, sharing one service and middleware registry.
pub struct App {
    pub config: Config,
    pub services: Arc<Services>,
    registry: MiddlewareRegistry,
    servers: Vec<Server>,
}

impl App {
    pub fn new(config: Config, services: Arc<Services>, registry: MiddlewareRegistry) -> Self {
        Self {
            config,
            services,
            registry,
            servers: Vec::new(),
        }
    }

    /// Initialises and starts the servers in configuration order. On the
    /// first failure the servers brought up so far are stopped again and the
    /// error is returned.
    pub async fn start(&mut self) -> Result<(), AppError> {
        for server_config in self.config.servers.clone() {
            let names = server_config.middleware.clone();
            let mut server = Server::new(server_config, self.services.clone());

            let outcome = match server.init(&self.registry, &names).await {
                Ok(()) => server.start().await.map(|_| ()),
                Err(e) => Err(e),
            };
            // Registered middleware are unregistered even if start failed.
            self.servers.push(server);

            if let Err(e) = outcome {
                tracing::error!("Startup failed: {}", e);
                self.stop().await;
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn stop(&mut self) {
        let results = join_all(self.servers.iter_mut().map(|server| server.stop())).await;
        for (server, result) in self.servers.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!("Server {} did not stop cleanly: {}", server.name(), e);
            }
        }
        self.servers.clear();
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.name() == name)
    }
}
