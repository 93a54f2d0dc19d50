use std::net::SocketAddr;

use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::ConfigError;
use crate::result::ApiResult;
use crate::session::BridgeError;
use crate::utils::error_codes;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown middleware: {0}")]
    UnknownMiddleware(String),

    #[error("middleware {name} failed to register on server {server}: {reason}")]
    Middleware {
        name: String,
        server: String,
        reason: String,
    },

    #[error("failed to set up {name}: {reason}")]
    Backend { name: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server {0} is already initialised")]
    AlreadyInitialised(String),

    #[error("server {0} is already running")]
    AlreadyRunning(String),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] BridgeError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
            ),
        };

        let message = if status.is_server_error() {
            tracing::error!("request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ApiResult::<()>::error(code, message))).into_response()
    }
}
