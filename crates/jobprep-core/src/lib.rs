//! JobPrep Core
//!
//! Application-level wiring: configuration, logging and one session
//! manager per execution context over a shared store.

mod app;
mod config;
mod error;

pub use app::App;
pub use config::Config;
pub use error::CoreError;

pub use jobprep_session::{
    ActivityKind, EndReason, SessionChange, SessionConfig, SessionData, SessionError,
    SessionEventKind, SessionManager, SessionState, TickOutcome, UserProfile,
};
pub use jobprep_storage::{Database, SharedStore, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
