use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MIDDLEWARE: &str = "logger,cors,parser,session,routes";
pub const DEFAULT_TOKEN_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub project_name: String,
    pub servers: Vec<ServerConfig>,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub user_table: String,
    pub geoip_url: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub middleware: Vec<String>,
    pub body_limit: usize,
    pub static_dir: Option<String>,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SessionConfig {
    pub bridge: String,
    pub secret: Option<String>,
    pub save_interval_secs: u64,
    pub expire_timeout_secs: u64,
    pub expire_interval_secs: u64,
    pub session_repository: String,
    pub user_repository: String,
    pub ip_header: Option<String>,
    pub model: String,
    pub token_length: usize,
    pub token_alphabet: String,
    /// `None` disables cookie issuance for the server.
    pub cookie: Option<String>,
}

impl SessionConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn expire_timeout(&self) -> Duration {
        Duration::from_secs(self.expire_timeout_secs)
    }

    pub fn expire_interval(&self) -> Duration {
        Duration::from_secs(self.expire_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bridge: "repository".into(),
            secret: None,
            save_interval_secs: 30,
            expire_timeout_secs: 30 * 24 * 3600,
            expire_interval_secs: 3600,
            session_repository: "memory".into(),
            user_repository: "memory".into(),
            ip_header: None,
            model: "sessions".into(),
            token_length: 64,
            token_alphabet: DEFAULT_TOKEN_ALPHABET.into(),
            cookie: None,
        }
    }
}

impl ServerConfig {
    /// A server on `127.0.0.1:0` with default session settings.
    pub fn local(name: &str) -> Self {
        Self {
            name: name.to_string(),
            host: "127.0.0.1".into(),
            port: 0,
            middleware: split_list(DEFAULT_MIDDLEWARE),
            body_limit: 2 * 1024 * 1024,
            static_dir: None,
            session: SessionConfig::default(),
        }
    }
}

/// Flat key/value view with per-server overrides: `API_PORT` wins over `PORT`
/// when resolving `PORT` for the server named `api`.
struct Vars(HashMap<String, String>);

impl Vars {
    fn global(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn scoped(&self, server: &str, key: &str) -> Option<String> {
        let scoped_key = format!("{}_{}", server.to_uppercase().replace('-', "_"), key);
        self.0.get(&scoped_key).cloned().or_else(|| self.global(key))
    }

    fn parsed<T: std::str::FromStr>(
        &self,
        server: &str,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.scoped(server, key) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars = Vars(vars.into_iter().collect());

        let project_name = vars
            .global("PROJECT_NAME")
            .unwrap_or_else(|| "webbridge".into());
        let names = split_list(&vars.global("SERVERS").unwrap_or_else(|| "api".into()));
        if names.is_empty() {
            return Err(ConfigError::Missing("SERVERS".into()));
        }

        let mut servers = Vec::with_capacity(names.len());
        for name in names {
            servers.push(Self::server_from_vars(&vars, &name, &project_name)?);
        }

        Ok(Config {
            project_name,
            servers,
            redis_url: vars.global("REDIS_URL"),
            database_url: vars.global("DATABASE_URL"),
            user_table: vars.global("USER_TABLE").unwrap_or_else(|| "users".into()),
            geoip_url: vars.global("GEOIP_URL"),
        })
    }

    fn server_from_vars(
        vars: &Vars,
        name: &str,
        project_name: &str,
    ) -> Result<ServerConfig, ConfigError> {
        let defaults = SessionConfig::default();
        let cookie = match vars.scoped(name, "SESSION_COOKIE") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.trim().to_string()),
            None => Some(cookie_name(name, project_name)),
        };

        let session = SessionConfig {
            bridge: vars
                .scoped(name, "SESSION_BRIDGE")
                .unwrap_or(defaults.bridge),
            secret: vars.scoped(name, "SESSION_SECRET"),
            save_interval_secs: vars.parsed(
                name,
                "SESSION_SAVE_INTERVAL",
                defaults.save_interval_secs,
            )?,
            expire_timeout_secs: vars.parsed(
                name,
                "SESSION_EXPIRE_TIMEOUT",
                defaults.expire_timeout_secs,
            )?,
            expire_interval_secs: vars.parsed(
                name,
                "SESSION_EXPIRE_INTERVAL",
                defaults.expire_interval_secs,
            )?,
            session_repository: vars
                .scoped(name, "SESSION_REPOSITORY")
                .unwrap_or(defaults.session_repository),
            user_repository: vars
                .scoped(name, "SESSION_USER_REPOSITORY")
                .unwrap_or(defaults.user_repository),
            ip_header: vars.scoped(name, "SESSION_IP_HEADER"),
            model: vars.scoped(name, "SESSION_MODEL").unwrap_or(defaults.model),
            token_length: vars.parsed(name, "SESSION_TOKEN_LENGTH", defaults.token_length)?,
            token_alphabet: vars
                .scoped(name, "SESSION_TOKEN_ALPHABET")
                .unwrap_or(defaults.token_alphabet),
            cookie,
        };

        if session.token_length == 0 {
            return Err(ConfigError::Invalid {
                key: "SESSION_TOKEN_LENGTH".into(),
                value: "0".into(),
            });
        }
        if session.token_alphabet.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SESSION_TOKEN_ALPHABET".into(),
                value: String::new(),
            });
        }

        Ok(ServerConfig {
            name: name.to_string(),
            host: vars.scoped(name, "HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: vars.parsed(name, "PORT", 3000)?,
            middleware: split_list(
                &vars
                    .scoped(name, "MIDDLEWARE")
                    .unwrap_or_else(|| DEFAULT_MIDDLEWARE.into()),
            ),
            body_limit: vars.parsed(name, "BODY_LIMIT", 2 * 1024 * 1024)?,
            static_dir: vars.scoped(name, "STATIC_DIR"),
            session,
        })
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

pub fn cookie_name(server: &str, project: &str) -> String {
    format!("sid_{}_{}", server, project)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_without_any_variables() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert_eq!(config.project_name, "webbridge");
        assert_eq!(config.servers.len(), 1);

        let api = config.server("api").unwrap();
        assert_eq!(api.port, 3000);
        assert_eq!(
            api.middleware,
            vec!["logger", "cors", "parser", "session", "routes"]
        );
        assert_eq!(api.session.cookie.as_deref(), Some("sid_api_webbridge"));
        assert_eq!(api.session.expire_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn server_scoped_keys_override_global_ones() {
        let config = Config::from_vars(vars(&[
            ("PROJECT_NAME", "shop"),
            ("SERVERS", "api, admin"),
            ("PORT", "8080"),
            ("ADMIN_PORT", "9090"),
            ("SESSION_SECRET", "global"),
            ("ADMIN_SESSION_SECRET", "admin-only"),
            ("ADMIN_SESSION_COOKIE", ""),
        ]))
        .unwrap();

        let api = config.server("api").unwrap();
        let admin = config.server("admin").unwrap();
        assert_eq!(api.port, 8080);
        assert_eq!(admin.port, 9090);
        assert_eq!(api.session.secret.as_deref(), Some("global"));
        assert_eq!(admin.session.secret.as_deref(), Some("admin-only"));
        assert_eq!(api.session.cookie.as_deref(), Some("sid_api_shop"));
        assert_eq!(admin.session.cookie, None);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_vars(vars(&[("SESSION_EXPIRE_TIMEOUT", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "SESSION_EXPIRE_TIMEOUT".into(),
                value: "soon".into()
            }
        );
    }
}
