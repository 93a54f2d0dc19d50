use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::{RouteModule, WebServer};
use crate::session::UserRepository;

pub mod handler;
pub mod model;

pub const PRIORITY: i32 = 10;

#[derive(Clone)]
pub struct SessionRoutesState {
    pub users: Option<Arc<dyn UserRepository>>,
}

pub fn module(server: &WebServer) -> RouteModule {
    let state = SessionRoutesState {
        users: server
            .services
            .user_repository(&server.config.session.user_repository),
    };

    let router = Router::new()
        .route("/session", get(handler::current).put(handler::replace_payload))
        .route("/session/login", post(handler::login))
        .route("/session/logout", post(handler::logout))
        .with_state(state);

    RouteModule::new("session", PRIORITY, router)
}
