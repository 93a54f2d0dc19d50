use axum::{Router, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::server::{RouteModule, WebServer};
use crate::utils::success_to_api_response;

#[derive(Serialize)]
struct Health {
    server: String,
    status: &'static str,
}

pub fn module(server: &WebServer) -> RouteModule {
    let name = server.name().to_string();
    let router = Router::new().route(
        "/health",
        get(move || {
            let server = name.clone();
            async move { success_to_api_response(Health { server, status: "ok" }).into_response() }
        }),
    );
    RouteModule::new("health", 0, router)
}
