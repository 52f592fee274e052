//! JobPrep Storage Layer
//!
//! A persisted string key-value store shared by every execution context
//! (tab/window) of the application, plus the change broadcast those
//! contexts use to observe each other's writes.

mod database;
mod error;
mod migrations;
mod shared;

pub use database::Database;
pub use error::StorageError;
pub use shared::{ContextId, SharedStore, StorageEvent, StorageSubscription, StoreContext};

pub type Result<T> = std::result::Result<T, StorageError>;
