//! Session State Machine
//!
//! The store is the source of truth for whether a session is active; the
//! cached flag only exists to detect transitions so that listeners are
//! notified once per edge.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::{duration_ms, Clock};
use crate::config::{ActivityMerge, MissingExpiryPolicy, SessionConfig};
use crate::error::SessionError;
use crate::notifier::{EndReason, Notifier, SessionChange};
use crate::session::{SessionData, UserProfile};
use crate::state::SessionState;
use crate::store::{SessionStore, StorageKeys};
use crate::Result;

/// Every transition holds this lock across its store access and flag
/// update, so a store read and the cached flag can never disagree mid-way.
struct Local {
    /// Last observed state, for edge detection only
    active: bool,
    last_activity: i64,
    /// When `last_activity` was last persisted
    last_activity_write: Option<i64>,
}

pub struct SessionMachine {
    store: SessionStore,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    session_id: RwLock<String>,
    local: Mutex<Local>,
}

impl SessionMachine {
    /// Build the machine and compute its initial state from the store.
    pub fn new(store: SessionStore, config: SessionConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let now = clock.now_ms();
        let last_activity = store.last_active()?.unwrap_or(now);

        let machine = Self {
            store,
            config,
            clock,
            notifier: Notifier::new(),
            session_id: RwLock::new(String::new()),
            local: Mutex::new(Local {
                active: false,
                last_activity,
                last_activity_write: None,
            }),
        };

        machine.ensure_session_id()?;
        let active = machine.is_active();
        machine.local.lock().active = active;

        Ok(machine)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn keys(&self) -> &StorageKeys {
        self.store.keys()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn session_id(&self) -> String {
        self.session_id.read().clone()
    }

    /// Cached state as of the last transition.
    pub fn state(&self) -> SessionState {
        SessionState::from_active(self.local.lock().active)
    }

    pub fn last_activity_at(&self) -> i64 {
        self.local.lock().last_activity
    }

    /// Begin (or refresh) a session for `user`.
    pub fn start(&self, user: &UserProfile, token: &str) -> Result<SessionChange> {
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        if user.username.trim().is_empty() {
            return Err(SessionError::EmptyUsername);
        }

        let user_json = serde_json::to_string(user)?;
        let change = {
            let mut local = self.local.lock();
            let now = self.now();
            self.store
                .write_session(token, &user_json, now + duration_ms(self.config.session_duration))?;
            self.persist_activity(&mut local, now)?;
            local.active = true;
            SessionChange::started(self.session_id(), now)
        };

        tracing::info!(
            session_id = %change.session_id,
            username = %user.username,
            "Session started"
        );
        self.notifier.emit(&change);

        Ok(change)
    }

    /// Clear the stored session. Notifies only if this context considered the
    /// session active, so repeated calls produce one `ended` event.
    pub fn end(&self, reason: EndReason) -> Result<Option<SessionChange>> {
        let (cleared, was_active) = {
            let mut local = self.local.lock();
            let cleared = self.store.clear_session()?;
            (cleared, std::mem::replace(&mut local.active, false))
        };

        if !was_active {
            if cleared {
                tracing::debug!(reason = %reason, "Cleared stale session keys");
            }
            return Ok(None);
        }

        let change = SessionChange::ended(self.session_id(), self.now(), reason);
        tracing::info!(session_id = %change.session_id, reason = %reason, "Session ended");
        self.notifier.emit(&change);

        Ok(Some(change))
    }

    /// Push the absolute deadline forward. No-op unless a session is active.
    pub fn extend(&self) -> Result<bool> {
        if !self.is_active() {
            return Ok(false);
        }

        let expiry_at = self.now() + duration_ms(self.config.session_duration);
        self.store.set_token_expiry(expiry_at)?;
        tracing::debug!(expiry_at, "Session extended");

        Ok(true)
    }

    /// Recompute from the store: a token must be present and its deadline
    /// (if any) still in the future.
    pub fn is_active(&self) -> bool {
        match self.read_active() {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session state");
                false
            }
        }
    }

    fn read_active(&self) -> Result<bool> {
        if self.store.token()?.is_none() {
            return Ok(false);
        }

        Ok(match self.store.token_expiry()? {
            Some(expiry_at) => self.now() < expiry_at,
            None => self.config.missing_expiry == MissingExpiryPolicy::NeverExpires,
        })
    }

    /// The current session, or `None` when there is no valid one.
    pub fn get_data(&self) -> Option<SessionData> {
        match self.read_data() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Error getting session data");
                None
            }
        }
    }

    fn read_data(&self) -> Result<Option<SessionData>> {
        if !self.is_active() {
            return Ok(None);
        }

        let (Some(token), Some(user_json)) = (self.store.token()?, self.store.user_json()?) else {
            return Ok(None);
        };
        let user: UserProfile = serde_json::from_str(&user_json)?;

        Ok(Some(SessionData {
            token,
            user,
            expiry_at: self.store.token_expiry()?,
            session_id: self.session_id(),
            last_activity_at: self.last_activity_at(),
        }))
    }

    /// Compare the store against the cached state and notify on a change.
    pub fn check_session(&self) -> Option<SessionChange> {
        if let Err(e) = self.ensure_session_id() {
            tracing::warn!(error = %e, "Failed to restore session id");
        }

        let change = {
            let mut local = self.local.lock();
            let active = self.is_active();
            if local.active == active {
                return None;
            }
            local.active = active;

            let now = self.now();
            if active {
                SessionChange::started(self.session_id(), now)
            } else {
                let reason = match self.store.token() {
                    Ok(Some(_)) => EndReason::Expired,
                    _ => EndReason::EndedInOtherTab,
                };
                SessionChange::ended(self.session_id(), now, reason)
            }
        };

        tracing::info!(
            session_id = %change.session_id,
            event = ?change.event,
            reason = ?change.reason,
            "Session state changed"
        );
        self.notifier.emit(&change);

        Some(change)
    }

    /// Another context already cleared the session: go inactive without
    /// touching the store.
    pub fn mark_ended_elsewhere(&self) -> Option<SessionChange> {
        if !std::mem::replace(&mut self.local.lock().active, false) {
            return None;
        }

        let change = SessionChange::ended(self.session_id(), self.now(), EndReason::EndedInOtherTab);
        tracing::info!(session_id = %change.session_id, "Session ended in another tab");
        self.notifier.emit(&change);

        Some(change)
    }

    /// Note an interaction now. Returns whether it was persisted, which is
    /// throttled by `activity_write_interval`.
    pub fn record_activity(&self) -> Result<bool> {
        let interval = duration_ms(self.config.activity_write_interval);
        let mut local = self.local.lock();
        let now = self.now();
        local.last_activity = now;
        let due = local
            .last_activity_write
            .map_or(true, |written| now - written >= interval);

        if due {
            self.persist_activity(&mut local, now)?;
        }
        Ok(due)
    }

    fn persist_activity(&self, local: &mut Local, at: i64) -> Result<()> {
        local.last_activity = at;
        local.last_activity_write = Some(at);
        self.store.set_last_active(at)
    }

    /// Fold in a last-activity time written by another context.
    pub fn merge_last_activity(&self, incoming: i64) -> i64 {
        let mut local = self.local.lock();
        local.last_activity = match self.config.activity_merge {
            ActivityMerge::Latest => local.last_activity.max(incoming),
            ActivityMerge::LastWriterWins => incoming,
        };
        local.last_activity
    }

    /// Time since the last recorded interaction.
    pub fn idle_for(&self) -> i64 {
        self.now() - self.last_activity_at()
    }

    /// True when the deadline is within `threshold` but not yet reached.
    pub fn is_expiring_soon(&self, threshold: Duration) -> bool {
        let expiry_at = match self.store.token_expiry() {
            Ok(Some(expiry_at)) => expiry_at,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session expiry");
                return false;
            }
        };

        let remaining = expiry_at - self.now();
        remaining > 0 && remaining < duration_ms(threshold)
    }

    /// Adopt the persisted id, or generate one if the store has none.
    fn ensure_session_id(&self) -> Result<()> {
        match self.store.session_id()? {
            Some(id) => {
                let mut current = self.session_id.write();
                if *current != id {
                    *current = id;
                }
            }
            None => {
                self.regenerate_session_id()?;
            }
        }
        Ok(())
    }

    pub fn regenerate_session_id(&self) -> Result<String> {
        let id = generate_session_id(self.now());
        self.store.set_session_id(&id)?;
        *self.session_id.write() = id.clone();
        tracing::debug!(session_id = %id, "Generated session id");
        Ok(id)
    }
}

fn generate_session_id(now: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now, &random[..13])
}
