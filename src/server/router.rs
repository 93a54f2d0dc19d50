use axum::Router;

/// Routes contributed by one module. Higher priority modules are consulted
/// first; ties keep their registration order.
pub struct RouteModule {
    pub name: String,
    pub priority: i32,
    pub router: Router,
}

impl RouteModule {
    pub fn new(name: impl Into<String>, priority: i32, router: Router) -> Self {
        Self {
            name: name.into(),
            priority,
            router,
        }
    }
}

/// Stable sort by descending priority.
pub fn order_modules(modules: &mut [RouteModule]) {
    modules.sort_by(|a, b| b.priority.cmp(&a.priority));
}

/// Mounts already ordered modules at `/`: each module falls back to the ones
/// after it, so the first module that has a matching route answers.
pub fn compose(modules: Vec<RouteModule>) -> Router {
    modules
        .into_iter()
        .rev()
        .fold(None::<Router>, |rest, module| match rest {
            Some(rest) => Some(module.router.fallback_service(rest)),
            None => Some(module.router),
        })
        .unwrap_or_default()
}
