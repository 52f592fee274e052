//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(#[from] jobprep_storage::StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session token cannot be empty")]
    EmptyToken,

    #[error("User name cannot be empty")]
    EmptyUsername,

    #[error("No tokio runtime available for background tasks")]
    NoRuntime,

    #[error("Background tasks are already running")]
    AlreadyRunning,

    #[error("Session manager has been shut down")]
    ShutDown,
}
