//! Session bridge: turns the signed session cookie of a request into a
//! [`Session`], hands it to handlers through [`SessionContext`] and persists
//! it again when the response completes.

pub mod bridge;
pub mod context;
pub mod meta;
pub mod middleware;
pub mod model;
pub mod registry;
pub mod repository;
pub mod token;

pub use bridge::{BridgeError, BridgeSettings, RepositoryBridge, SessionBridge};
pub use context::SessionContext;
pub use meta::{GeoLocator, HttpGeoLocator, RequestMeta};
pub use middleware::{SessionState, session_middleware};
pub use model::{Payload, Session, SessionInfo, SessionRecord, User};
pub use registry::BridgeRegistry;
pub use repository::{
    MemorySessionRepository, MemoryUserRepository, PgUserRepository, RedisSessionRepository,
    RepositoryError, SessionRepository, UserRepository,
};
