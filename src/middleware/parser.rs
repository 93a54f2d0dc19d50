use async_trait::async_trait;
use tower_http::limit::RequestBodyLimitLayer;

use super::Middleware;
use crate::error::AppError;
use crate::server::WebServer;

/// Caps request bodies at the server's `BODY_LIMIT`; decoding itself is left
/// to the extractors.
pub struct ParserMiddleware;

#[async_trait]
impl Middleware for ParserMiddleware {
    fn name(&self) -> &str {
        "parser"
    }

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError> {
        let limit = server.config.body_limit;
        server.add_stage("parser", move |router| {
            router.layer(RequestBodyLimitLayer::new(limit))
        });
        Ok(())
    }

    async fn unregister(&self, server: &mut WebServer) -> Result<(), AppError> {
        server.remove_stage("parser");
        Ok(())
    }
}
