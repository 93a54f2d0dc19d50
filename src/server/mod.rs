//! Named servers and their lifecycle.
//!
//! A [`Server`] owns a [`WebServer`], the mutable description middleware
//! register against, and drives it through `init` (register middleware in
//! order), `start` (bind and serve) and `stop` (drain, then unregister in
//! order).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::serve::ListenerExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::middleware::{Middleware, MiddlewareRegistry};
use crate::services::Services;

pub mod events;
pub mod router;

pub use events::{EventHandler, EventHub, ServerEvent, SubscriptionId, connection_tap};
pub use router::RouteModule;

type Wrap = Box<dyn Fn(Router) -> Router + Send + Sync>;

/// A named wrapper around everything registered after it.
pub struct Stage {
    pub name: String,
    wrap: Wrap,
}

/// The server object middleware mutate while registering.
pub struct WebServer {
    pub config: ServerConfig,
    pub services: Arc<Services>,
    pub events: Arc<EventHub>,
    stages: Vec<Stage>,
    routes: Vec<RouteModule>,
}

impl WebServer {
    pub fn new(config: ServerConfig, services: Arc<Services>) -> Self {
        Self {
            config,
            services,
            events: Arc::new(EventHub::new()),
            stages: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Stages added earlier see requests first.
    pub fn add_stage<F>(&mut self, name: impl Into<String>, wrap: F)
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.stages.push(Stage {
            name: name.into(),
            wrap: Box::new(wrap),
        });
    }

    pub fn remove_stage(&mut self, name: &str) -> bool {
        let before = self.stages.len();
        self.stages.retain(|s| s.name != name);
        before != self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn mount(&mut self, module: RouteModule) {
        self.routes.push(module);
    }

    pub fn unmount(&mut self, name: &str) -> bool {
        let before = self.routes.len();
        self.routes.retain(|m| m.name != name);
        before != self.routes.len()
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|m| m.name.as_str()).collect()
    }

    /// Route modules ordered by priority, wrapped by the stages so the first
    /// registered stage is the outermost.
    pub fn build_router(&mut self) -> Router {
        router::order_modules(&mut self.routes);
        let modules = self
            .routes
            .iter()
            .map(|m| RouteModule::new(m.name.clone(), m.priority, m.router.clone()))
            .collect();
        let app = router::compose(modules);
        self.stages.iter().rev().fold(app, |app, stage| (stage.wrap)(app))
    }

    fn addr(&self) -> SocketAddr {
        let ip = self.config.host.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid host {} for server {}, falling back to dual-stack default",
                self.config.host,
                self.config.name
            );
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.config.port)
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

pub struct Server {
    web: WebServer,
    middleware: Vec<Arc<dyn Middleware>>,
    running: Option<Running>,
}

impl Server {
    pub fn new(config: ServerConfig, services: Arc<Services>) -> Self {
        Self {
            web: WebServer::new(config, services),
            middleware: Vec::new(),
            running: None,
        }
    }

    pub fn name(&self) -> &str {
        self.web.name()
    }

    pub fn web(&self) -> &WebServer {
        &self.web
    }

    /// The router `start` would serve, for driving the server in-process.
    pub fn router(&mut self) -> Router {
        self.web.build_router()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Resolves every name first, so an unknown name registers nothing; then
    /// registers each middleware, one at a time, in list order. A server is
    /// initialised once until `stop` unregisters its middleware again.
    pub async fn init(
        &mut self,
        registry: &MiddlewareRegistry,
        names: &[String],
    ) -> Result<(), AppError> {
        if !self.middleware.is_empty() {
            return Err(AppError::AlreadyInitialised(self.web.name().to_string()));
        }

        let resolved = names
            .iter()
            .map(|name| registry.resolve(name))
            .collect::<Result<Vec<_>, _>>()?;

        for middleware in resolved {
            tracing::debug!(
                "Registering middleware {} on server {}",
                middleware.name(),
                self.web.name()
            );
            middleware.register(&mut self.web).await?;
            self.middleware.push(middleware);
        }

        tracing::info!(
            "Server {} initialised with middleware [{}]",
            self.web.name(),
            names.join(", ")
        );
        Ok(())
    }

    pub async fn start(&mut self) -> Result<SocketAddr, AppError> {
        if self.running.is_some() {
            return Err(AppError::AlreadyRunning(self.web.name().to_string()));
        }

        let app = self.web.build_router();
        let addr = self.web.addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| AppError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let name = self.web.name().to_string();
        let events = self.web.events.clone();
        events.emit(&ServerEvent {
            server: name.clone(),
            name: events::LISTENING.to_string(),
            peer: None,
        });
        tracing::info!("Server {} listening on {}", name, local_addr);

        let (shutdown, signal) = oneshot::channel::<()>();
        let listener = listener.tap_io(connection_tap(name, events));
        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = signal.await;
            })
            .await
        });

        self.running = Some(Running {
            local_addr,
            shutdown,
            handle,
        });
        Ok(local_addr)
    }

    /// Drains in-flight requests, then unregisters middleware in the order
    /// they were registered. Unregistering continues past failures; the first
    /// error is returned.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        let mut first_error = None;

        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            match running.handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => first_error = Some(AppError::Serve(e)),
                Err(e) => tracing::error!("Server {} task failed: {}", self.web.name(), e),
            }
            self.web.events.emit(&ServerEvent {
                server: self.web.name().to_string(),
                name: events::CLOSE.to_string(),
                peer: None,
            });
        }

        for middleware in std::mem::take(&mut self.middleware) {
            if let Err(e) = middleware.unregister(&mut self.web).await {
                tracing::error!(
                    "Failed to unregister middleware {} from server {}: {}",
                    middleware.name(),
                    self.web.name(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        tracing::info!("Server {} stopped", self.web.name());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
