//! Session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_KEY_PREFIX: &str = "jobprep_";

/// How a stored token without an absolute deadline is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingExpiryPolicy {
    /// Only the inactivity window can end the session
    NeverExpires,
    /// The session is treated as already expired
    Expired,
}

/// How a last-activity time broadcast by another context is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMerge {
    /// Keep whichever of local and incoming is later
    Latest,
    /// Incoming always overwrites local
    LastWriterWins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Absolute session lifetime from start or last extension
    #[serde(with = "duration_ms")]
    pub session_duration: Duration,
    /// Expiry clock poll period
    #[serde(with = "duration_ms")]
    pub activity_check_interval: Duration,
    /// Sliding inactivity window
    #[serde(with = "duration_ms")]
    pub inactivity_timeout: Duration,
    /// Push the absolute deadline forward on tracked activity
    pub extend_on_activity: bool,
    /// Follow session changes made in other contexts
    pub sync_across_tabs: bool,
    pub missing_expiry: MissingExpiryPolicy,
    pub activity_merge: ActivityMerge,
    /// Minimum spacing between persisted activity writes; zero writes every time
    #[serde(with = "duration_ms")]
    pub activity_write_interval: Duration,
    /// Namespace for every persisted key
    pub key_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(24 * 60 * 60),
            activity_check_interval: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(30 * 60),
            extend_on_activity: true,
            sync_across_tabs: true,
            missing_expiry: MissingExpiryPolicy::NeverExpires,
            activity_merge: ActivityMerge::Latest,
            activity_write_interval: Duration::ZERO,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
