use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webbridge::{
    App, config::Config, middleware::MiddlewareRegistry, routes, services::Services,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let services = match Services::from_config(&config) {
        Ok(services) => Arc::new(services),
        Err(e) => {
            tracing::error!("Failed to set up services: {}", e);
            std::process::exit(1);
        }
    };

    let registry = MiddlewareRegistry::with_defaults(routes::default_providers());
    let mut app = App::new(config, services, registry);

    // A failed start has already stopped whatever came up.
    if let Err(e) = app.start().await {
        tracing::error!("Shutting down: {}", e);
        std::process::exit(1);
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping servers");
    app.stop().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
