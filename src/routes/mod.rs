use crate::middleware::RouteProvider;

pub mod health;
pub mod session;

/// Route modules mounted by the `routes` middleware.
pub fn default_providers() -> Vec<RouteProvider> {
    vec![session::module as RouteProvider, health::module]
}
