//! Shared store and change broadcast
//!
//! Every execution context gets its own [`StoreContext`] over one
//! [`Database`]. A write that changes a value is broadcast to every other
//! context, mirroring the host "storage" event: the writing context never
//! observes its own mutation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::database::Database;
use crate::Result;

const EVENT_CAPACITY: usize = 256;

/// Identifies one execution context (tab or window) attached to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A watched key changed in some context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Context that performed the write
    pub origin: ContextId,
}

pub struct SharedStore {
    db: Database,
    events: broadcast::Sender<StorageEvent>,
    next_context: Arc<AtomicU64>,
}

impl SharedStore {
    pub fn new(db: Database) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            db,
            events,
            next_context: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Attach a new execution context.
    pub fn context(&self) -> StoreContext {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(context = %id, "Attached store context");

        StoreContext {
            id,
            db: self.db.clone(),
            events: self.events.clone(),
        }
    }
}

impl Clone for SharedStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            events: self.events.clone(),
            next_context: Arc::clone(&self.next_context),
        }
    }
}

/// One context's view of the shared store.
#[derive(Clone)]
pub struct StoreContext {
    id: ContextId,
    db: Database,
    events: broadcast::Sender<StorageEvent>,
}

impl StoreContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.get_item(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let previous = self.db.set_item(key, value)?;
        if previous.as_deref() != Some(value) {
            self.publish(key, previous, Some(value.to_string()));
        }
        Ok(())
    }

    /// Delete `key`, returning the value it held.
    pub fn remove(&self, key: &str) -> Result<Option<String>> {
        let previous = self.db.remove_item(key)?;
        if let Some(old) = &previous {
            self.publish(key, Some(old.clone()), None);
        }
        Ok(previous)
    }

    /// Subscribe to writes made by other contexts.
    pub fn subscribe(&self) -> StorageSubscription {
        StorageSubscription {
            context: self.id,
            rx: self.events.subscribe(),
        }
    }

    fn publish(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        let event = StorageEvent {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.id,
        };
        // No receivers is not an error: nobody is listening yet.
        let _ = self.events.send(event);
    }
}

/// Receives [`StorageEvent`]s written by contexts other than the owner.
pub struct StorageSubscription {
    context: ContextId,
    rx: broadcast::Receiver<StorageEvent>,
}

impl StorageSubscription {
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Next pending foreign event, without waiting.
    pub fn try_next(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.origin == self.context => continue,
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(context = %self.context, skipped, "Storage subscription lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next foreign event. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.context => continue,
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(context = %self.context, skipped, "Storage subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
