//! Session change notifications
//!
//! Listeners register explicitly and are called synchronously, in
//! registration order, before the call that caused the transition returns.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Started,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Logout,
    Inactivity,
    Expired,
    EndedInOtherTab,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Logout => "logout",
            EndReason::Inactivity => "inactivity",
            EndReason::Expired => "expired",
            EndReason::EndedInOtherTab => "ended_in_other_tab",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `sessionChange` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChange {
    pub event: SessionEventKind,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// ms since epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EndReason>,
}

impl SessionChange {
    pub fn started(session_id: String, timestamp: i64) -> Self {
        Self {
            event: SessionEventKind::Started,
            session_id,
            timestamp,
            reason: None,
        }
    }

    pub fn ended(session_id: String, timestamp: i64, reason: EndReason) -> Self {
        Self {
            event: SessionEventKind::Ended,
            session_id,
            timestamp,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionChange) + Send + Sync>;

pub struct Notifier {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Forward every change into a channel, for async consumers.
    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<SessionChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |change| {
            let _ = tx.send(change.clone());
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn emit(&self, change: &SessionChange) {
        // Snapshot so a listener may (un)subscribe while being called.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| (*listener)(change))).is_err() {
                tracing::error!(
                    session_id = %change.session_id,
                    event = ?change.event,
                    "Session change listener panicked"
                );
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
