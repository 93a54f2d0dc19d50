use async_trait::async_trait;
use tower_http::cors::CorsLayer;

use super::Middleware;
use crate::error::AppError;
use crate::server::WebServer;

/// Permissive CORS, for browser clients served from another origin.
pub struct CorsMiddleware;

#[async_trait]
impl Middleware for CorsMiddleware {
    fn name(&self) -> &str {
        "cors"
    }

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError> {
        server.add_stage("cors", |router| router.layer(CorsLayer::permissive()));
        Ok(())
    }

    async fn unregister(&self, server: &mut WebServer) -> Result<(), AppError> {
        server.remove_stage("cors");
        Ok(())
    }
}
