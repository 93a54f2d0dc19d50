use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use webbridge::{
    App,
    config::{Config, ServerConfig},
    error::AppError,
    middleware::{Middleware, MiddlewareRegistry},
    routes,
    server::{Server, WebServer, events::CONNECTION},
    services::Services,
};

type Log = Arc<Mutex<Vec<String>>>;

/// Records register/unregister calls; earlier names sleep longer so an
/// overlapping run would interleave the log.
struct Recorder {
    name: String,
    delay: Duration,
    log: Log,
}

#[async_trait]
impl Middleware for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, server: &mut WebServer) -> Result<(), AppError> {
        self.push(format!("register {} {} begin", self.name, server.name()));
        tokio::time::sleep(self.delay).await;
        self.push(format!("register {} {} end", self.name, server.name()));
        Ok(())
    }

    async fn unregister(&self, server: &mut WebServer) -> Result<(), AppError> {
        self.push(format!("unregister {} {} begin", self.name, server.name()));
        tokio::time::sleep(self.delay).await;
        self.push(format!("unregister {} {} end", self.name, server.name()));
        Ok(())
    }
}

impl Recorder {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

fn recording_registry(names: &[&str], log: &Log) -> MiddlewareRegistry {
    let mut registry = MiddlewareRegistry::new();
    let count = names.len() as u64;
    for (i, name) in names.iter().enumerate() {
        let key = name.to_string();
        let name = key.clone();
        let log = log.clone();
        let delay = Duration::from_millis(10 * (count - i as u64));
        registry.define(&key, move || {
            Arc::new(Recorder {
                name: name.clone(),
                delay,
                log: log.clone(),
            })
        });
    }
    registry
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn taken_port() -> (StdTcpListener, u16) {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn middleware_register_and_unregister_one_at_a_time_in_list_order() {
    let log = Log::default();
    let list = ["parser", "session", "routes"];
    let registry = recording_registry(&list, &log);

    let mut server = Server::new(ServerConfig::local("api"), Arc::new(Services::new("test")));
    server.init(&registry, &names(&list)).await.unwrap();
    server.start().await.unwrap();
    server.stop().await.unwrap();

    let expected: Vec<String> = ["register", "unregister"]
        .iter()
        .flat_map(|phase| {
            list.iter().flat_map(move |name| {
                [
                    format!("{} {} api begin", phase, name),
                    format!("{} {} api end", phase, name),
                ]
            })
        })
        .collect();
    assert_eq!(*log.lock().unwrap(), expected);
}

#[tokio::test]
async fn unknown_middleware_name_registers_nothing() {
    let log = Log::default();
    let registry = recording_registry(&["parser"], &log);

    let mut server = Server::new(ServerConfig::local("api"), Arc::new(Services::new("test")));
    let err = server
        .init(&registry, &names(&["parser", "favicon"]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnknownMiddleware(name) if name == "favicon"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn init_runs_once_until_the_server_is_stopped() {
    let log = Log::default();
    let list = ["parser", "session", "routes"];
    let registry = recording_registry(&list, &log);

    let mut server = Server::new(ServerConfig::local("api"), Arc::new(Services::new("test")));
    server.init(&registry, &names(&list)).await.unwrap();
    let err = server.init(&registry, &names(&list)).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyInitialised(name) if name == "api"));
    assert_eq!(log.lock().unwrap().len(), 6);

    server.stop().await.unwrap();
    server.init(&registry, &names(&list)).await.unwrap();
    assert_eq!(log.lock().unwrap().len(), 18);
}

#[tokio::test]
async fn second_init_leaves_the_default_stack_untouched() {
    let mut config = ServerConfig::local("api");
    config.middleware = names(&["parser", "session", "routes"]);
    config.session.secret = Some("test-secret".into());
    let registry = MiddlewareRegistry::with_defaults(routes::default_providers());

    let mut server = Server::new(config.clone(), Arc::new(Services::new("test")));
    server.init(&registry, &config.middleware).await.unwrap();
    assert!(server.init(&registry, &config.middleware).await.is_err());

    assert_eq!(server.web().stage_names(), vec!["parser", "session"]);
    assert_eq!(server.web().route_names(), vec!["session", "health"]);
}

#[tokio::test]
async fn start_reports_a_port_that_is_already_taken() {
    let (_held, port) = taken_port();
    let mut config = ServerConfig::local("api");
    config.port = port;

    let mut server = Server::new(config, Arc::new(Services::new("test")));
    let err = server.start().await.unwrap_err();

    assert!(matches!(err, AppError::Bind { addr, .. } if addr.port() == port));
    assert!(server.local_addr().is_none());
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let mut server = Server::new(ServerConfig::local("api"), Arc::new(Services::new("test")));
    server.start().await.unwrap();

    assert!(matches!(server.start().await, Err(AppError::AlreadyRunning(_))));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn started_server_answers_over_tcp_and_reports_connections() {
    let mut config = ServerConfig::local("api");
    config.middleware = names(&["logger", "routes"]);
    let registry = MiddlewareRegistry::with_defaults(routes::default_providers());

    let mut server = Server::new(config.clone(), Arc::new(Services::new("test")));
    server.init(&registry, &config.middleware).await.unwrap();

    let events = server.web().events.clone();
    assert_eq!(events.subscriber_count(CONNECTION), 1);
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    let (id, count) = events.subscribe(
        CONNECTION,
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(count, 2);

    let addr = server.start().await.unwrap();
    let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["content"]["server"], "api");
    assert_eq!(body["content"]["status"], "ok");
    assert!(accepted.load(Ordering::SeqCst) >= 1);

    assert_eq!(events.unsubscribe(CONNECTION, id), 1);
    server.stop().await.unwrap();
    assert!(!events.is_active(CONNECTION));
}

#[tokio::test]
async fn failed_start_stops_the_servers_already_running() {
    let log = Log::default();
    let registry = recording_registry(&["parser"], &log);
    let (_held, port) = taken_port();

    let mut first = ServerConfig::local("api");
    first.middleware = names(&["parser"]);
    let mut second = ServerConfig::local("admin");
    second.middleware = names(&["parser"]);
    second.port = port;

    let config = Config {
        project_name: "test".into(),
        servers: vec![first, second],
        redis_url: None,
        database_url: None,
        user_table: "users".into(),
        geoip_url: None,
    };
    let mut app = App::new(config, Arc::new(Services::new("test")), registry);

    let err = app.start().await.unwrap_err();
    assert!(matches!(err, AppError::Bind { .. }));
    assert!(app.servers().is_empty());

    let log = log.lock().unwrap();
    assert!(log.contains(&"unregister parser api end".to_string()));
    assert!(log.contains(&"unregister parser admin end".to_string()));
}
