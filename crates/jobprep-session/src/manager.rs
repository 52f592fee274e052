//! Session Manager
//!
//! One instance per execution context. Owns the state machine and wires the
//! activity tracker, expiry clock and synchronizer to it, with an explicit
//! construct/shutdown lifecycle.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use jobprep_storage::{StorageEvent, StorageSubscription, StoreContext};

use crate::activity::{ActivityKind, ActivityTracker};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::expiry::{ExpiryClock, TickOutcome};
use crate::machine::SessionMachine;
use crate::notifier::{EndReason, ListenerId, SessionChange};
use crate::session::{SessionData, UserProfile};
use crate::state::SessionState;
use crate::store::{SessionStore, StorageKeys};
use crate::sync::Synchronizer;
use crate::Result;

/// Default look-ahead for [`SessionManager::is_expiring_soon`].
pub const EXPIRY_WARNING_THRESHOLD: Duration = Duration::from_secs(5 * 60);

pub struct SessionManager {
    machine: Arc<SessionMachine>,
    tracker: ActivityTracker,
    expiry: ExpiryClock,
    sync: Option<Arc<Synchronizer>>,
    background: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl SessionManager {
    pub fn new(context: StoreContext, config: SessionConfig) -> Result<Self> {
        Self::with_clock(context, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        context: StoreContext,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        // Subscribe before reading initial state so no write falls in between.
        let subscription = config.sync_across_tabs.then(|| context.subscribe());
        let store = SessionStore::new(context, StorageKeys::with_prefix(&config.key_prefix));
        let machine = Arc::new(SessionMachine::new(store, config, clock)?);

        let tracker = ActivityTracker::new(Arc::clone(&machine));
        let expiry = ExpiryClock::new(Arc::clone(&machine));
        let sync = subscription
            .map(|subscription| Arc::new(Synchronizer::new(Arc::clone(&machine), subscription)));

        tracing::info!(
            session_id = %machine.session_id(),
            context = %machine.store().context_id(),
            state = %machine.state(),
            "Session manager initialized"
        );

        Ok(Self {
            machine,
            tracker,
            expiry,
            sync,
            background: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        self.machine.config()
    }

    pub fn session_id(&self) -> String {
        self.machine.session_id()
    }

    pub fn regenerate_session_id(&self) -> Result<String> {
        self.machine.regenerate_session_id()
    }

    /// State as of the last observed transition.
    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    // === Session operations ===

    pub fn start(&self, user: &UserProfile, token: &str) -> Result<SessionChange> {
        self.machine.start(user, token)
    }

    /// End the session. Returns the notification sent, if this call caused one.
    pub fn end(&self, reason: EndReason) -> Result<Option<SessionChange>> {
        self.machine.end(reason)
    }

    pub fn logout(&self) -> Result<Option<SessionChange>> {
        self.end(EndReason::Logout)
    }

    pub fn extend(&self) -> Result<bool> {
        self.machine.extend()
    }

    pub fn is_active(&self) -> bool {
        self.machine.is_active()
    }

    pub fn get_data(&self) -> Option<SessionData> {
        self.machine.get_data()
    }

    pub fn check_session(&self) -> Option<SessionChange> {
        self.machine.check_session()
    }

    pub fn is_expiring_soon(&self, threshold: Duration) -> bool {
        self.machine.is_expiring_soon(threshold)
    }

    // === Listeners ===

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionChange) + Send + Sync + 'static,
    {
        self.machine.notifier().subscribe(listener)
    }

    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<SessionChange>) {
        self.machine.notifier().subscribe_channel()
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.machine.notifier().unsubscribe(id)
    }

    // === Host callbacks ===

    pub fn record_activity(&self, kind: ActivityKind) -> Result<bool> {
        self.tracker.record(kind)
    }

    pub fn record_activity_event(&self, name: &str) -> Result<bool> {
        self.tracker.record_event(name)
    }

    /// Run one expiry check by hand.
    pub fn tick(&self) -> Result<TickOutcome> {
        if self.is_shut_down() {
            return Err(SessionError::ShutDown);
        }
        self.expiry.tick()
    }

    /// Handle broadcasts from other contexts that arrived since the last call.
    pub fn process_pending(&self) -> usize {
        self.sync.as_ref().map_or(0, |sync| sync.process_pending())
    }

    /// Run the expiry clock and synchronizer on the current tokio runtime.
    pub fn spawn_background(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(SessionError::ShutDown);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let mut background = self.background.lock();
        if background.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let expiry = self.expiry.clone();
        let sync = self.sync.clone();
        let subscription = sync.as_ref().and_then(|sync| sync.take_subscription());

        *background = Some(runtime.spawn(run_background(expiry, sync, subscription)));
        tracing::debug!(session_id = %self.session_id(), "Started session background tasks");

        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Cancel the expiry clock and drop every subscription and listener.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.background.lock().take() {
            handle.abort();
        }
        if let Some(sync) = &self.sync {
            sync.detach();
        }
        self.tracker.detach();
        self.machine.notifier().clear();

        tracing::info!(session_id = %self.session_id(), "Session manager shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.background.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_background(
    expiry: ExpiryClock,
    sync: Option<Arc<Synchronizer>>,
    mut subscription: Option<StorageSubscription>,
) {
    let mut ticker = tokio::time::interval(expiry.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = expiry.tick() {
                    tracing::warn!(error = %e, "Session expiry check failed");
                }
            }
            event = next_event(&mut subscription) => match (event, &sync) {
                (Some(event), Some(sync)) => {
                    sync.handle(&event);
                }
                (None, _) => {
                    tracing::debug!("Storage broadcast closed");
                    subscription = None;
                }
                _ => {}
            },
        }
    }
}

async fn next_event(subscription: &mut Option<StorageSubscription>) -> Option<StorageEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
