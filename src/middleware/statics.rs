use async_trait::async_trait;
use axum::Router;
use tower_http::services::ServeDir;

use super::Middleware;
use crate::error::AppError;
use crate::server::WebServer;

/// Serves files from `STATIC_DIR`; requests without a matching file go on
/// to the rest of the stack.
pub struct StaticMiddleware;

#[async_trait]
impl Middleware for StaticMiddleware {
    fn name(&self) -> &str {
        "static"
    }

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError> {
        let Some(dir) = server.config.static_dir.clone() else {
            return Err(AppError::Middleware {
                name: "static".into(),
                server: server.name().to_string(),
                reason: "STATIC_DIR is not set".into(),
            });
        };

        server.add_stage("static", move |inner| {
            let files = ServeDir::new(&dir)
                .call_fallback_on_method_not_allowed(true)
                .fallback(inner);
            Router::new().fallback_service(files)
        });
        Ok(())
    }

    async fn unregister(&self, server: &mut WebServer) -> Result<(), AppError> {
        server.remove_stage("static");
        Ok(())
    }
}
