use serde::{Deserialize, Serialize};

use crate::session::{Payload, User};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Whether the request is backed by a session at all.
    pub active: bool,
    pub payload: Payload,
    pub user: Option<User>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub destroyed: bool,
}
