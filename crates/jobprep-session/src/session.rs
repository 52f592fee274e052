//! Session data structures

use serde::{Deserialize, Serialize};

/// Profile record stored alongside the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name
    pub username: String,
    /// Any further fields the auth backend returned
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A reconstructed view of the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user: UserProfile,
    /// Absolute deadline, ms since epoch; `None` if the store holds none
    pub expiry_at: Option<i64>,
    pub session_id: String,
    pub last_activity_at: i64,
}
