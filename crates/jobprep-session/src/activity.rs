//! Activity Tracker

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::machine::SessionMachine;
use crate::Result;

/// The interaction signals that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerDown,
    KeyDown,
    TouchStart,
    Scroll,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::PointerDown,
        ActivityKind::KeyDown,
        ActivityKind::TouchStart,
        ActivityKind::Scroll,
    ];

    /// DOM event name this signal arrives as.
    pub fn event_name(&self) -> &'static str {
        match self {
            ActivityKind::PointerDown => "mousedown",
            ActivityKind::KeyDown => "keydown",
            ActivityKind::TouchStart => "touchstart",
            ActivityKind::Scroll => "scroll",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.event_name() == name)
    }
}

pub struct ActivityTracker {
    machine: Arc<SessionMachine>,
    attached: AtomicBool,
}

impl ActivityTracker {
    pub fn new(machine: Arc<SessionMachine>) -> Self {
        Self {
            machine,
            attached: AtomicBool::new(true),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Stop reacting to signals.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    /// Handle one interaction. Returns false once detached.
    pub fn record(&self, kind: ActivityKind) -> Result<bool> {
        if !self.is_attached() {
            return Ok(false);
        }

        let persisted = self.machine.record_activity()?;
        tracing::trace!(kind = kind.event_name(), persisted, "Recorded activity");

        // Writes are coalesced together with the extension they would trigger.
        if persisted && self.machine.config().extend_on_activity {
            self.machine.extend()?;
        }

        Ok(true)
    }

    /// Handle a raw DOM event; untracked event names are ignored.
    pub fn record_event(&self, name: &str) -> Result<bool> {
        match ActivityKind::from_event_name(name) {
            Some(kind) => self.record(kind),
            None => Ok(false),
        }
    }
}
