//! JobPrep Session Management
//!
//! Tracks whether the user is authenticated across every tab sharing one
//! persisted store:
//! - A session is a token plus user profile with an absolute deadline
//! - Tracked interactions slide an inactivity window and extend the deadline
//! - A periodic check ends sessions that are idle or past their deadline
//! - Writes from other tabs are reconciled through the store's broadcast
//! - Every transition is announced once to registered listeners

mod activity;
mod clock;
mod config;
mod error;
mod expiry;
mod machine;
mod manager;
mod notifier;
mod session;
mod state;
mod store;
mod sync;

pub use activity::{ActivityKind, ActivityTracker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ActivityMerge, MissingExpiryPolicy, SessionConfig, DEFAULT_KEY_PREFIX};
pub use error::SessionError;
pub use expiry::{ExpiryClock, TickOutcome};
pub use machine::SessionMachine;
pub use manager::{SessionManager, EXPIRY_WARNING_THRESHOLD};
pub use notifier::{EndReason, ListenerId, Notifier, SessionChange, SessionEventKind};
pub use session::{SessionData, UserProfile};
pub use state::SessionState;
pub use store::{SessionStore, StorageKeys};
pub use sync::{SyncAction, Synchronizer};

pub type Result<T> = std::result::Result<T, SessionError>;
