//! Cross-Context Synchronizer
//!
//! Reconciles this context's cached state with writes made by other
//! contexts. Reactions never write the session keys back: the write being
//! observed has already happened.

use jobprep_storage::{StorageEvent, StorageSubscription};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::machine::SessionMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Ignored,
    /// Token removed elsewhere while this context was active
    EndedElsewhere,
    /// Token written elsewhere and adopted as a valid session
    Adopted,
    /// Local last-activity time after merging
    ActivityMerged(i64),
}

pub struct Synchronizer {
    machine: Arc<SessionMachine>,
    subscription: Mutex<Option<StorageSubscription>>,
}

impl Synchronizer {
    pub fn new(machine: Arc<SessionMachine>, subscription: StorageSubscription) -> Self {
        Self {
            machine,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Drop the subscription; nothing further is received.
    pub fn detach(&self) {
        self.subscription.lock().take();
    }

    pub(crate) fn take_subscription(&self) -> Option<StorageSubscription> {
        self.subscription.lock().take()
    }

    /// Handle every pending event. Returns how many were received.
    pub fn process_pending(&self) -> usize {
        let events: Vec<StorageEvent> = {
            let mut guard = self.subscription.lock();
            match guard.as_mut() {
                Some(subscription) => std::iter::from_fn(|| subscription.try_next()).collect(),
                None => Vec::new(),
            }
        };

        for event in &events {
            self.handle(event);
        }
        events.len()
    }

    pub fn handle(&self, event: &StorageEvent) -> SyncAction {
        let keys = self.machine.keys();

        if event.key == keys.token {
            self.handle_token(event)
        } else if event.key == keys.last_active {
            self.handle_last_active(event)
        } else {
            SyncAction::Ignored
        }
    }

    fn handle_token(&self, event: &StorageEvent) -> SyncAction {
        let locally_active = self.machine.state().is_active();
        let token_present = event
            .new_value
            .as_deref()
            .is_some_and(|token| !token.is_empty());

        match (token_present, locally_active) {
            (false, true) => {
                tracing::debug!(origin = %event.origin, "Token removed in another context");
                self.machine.mark_ended_elsewhere();
                SyncAction::EndedElsewhere
            }
            (true, false) => {
                tracing::debug!(origin = %event.origin, "Token set in another context");
                match self.machine.check_session() {
                    Some(_) => SyncAction::Adopted,
                    None => SyncAction::Ignored,
                }
            }
            _ => SyncAction::Ignored,
        }
    }

    fn handle_last_active(&self, event: &StorageEvent) -> SyncAction {
        let Some(raw) = event.new_value.as_deref() else {
            return SyncAction::Ignored;
        };

        match raw.trim().parse::<i64>() {
            Ok(incoming) => SyncAction::ActivityMerged(self.machine.merge_last_activity(incoming)),
            Err(e) => {
                tracing::warn!(
                    origin = %event.origin,
                    value = %raw,
                    error = %e,
                    "Ignoring malformed last-activity broadcast"
                );
                SyncAction::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SessionConfig;
    use crate::notifier::EndReason;
    use crate::session::UserProfile;
    use crate::store::{SessionStore, StorageKeys};
    use jobprep_storage::{SharedStore, StoreContext};

    const NOW: i64 = 1_700_000_000_000;

    struct Tab {
        machine: Arc<SessionMachine>,
        sync: Synchronizer,
    }

    fn open_tab(context: StoreContext, clock: &ManualClock) -> Tab {
        let subscription = context.subscribe();
        let store = SessionStore::new(context, StorageKeys::default());
        let machine = Arc::new(
            SessionMachine::new(store, SessionConfig::default(), Arc::new(clock.clone())).unwrap(),
        );
        let sync = Synchronizer::new(Arc::clone(&machine), subscription);
        Tab { machine, sync }
    }

    fn event(key: &str, new_value: Option<&str>, origin: &StoreContext) -> StorageEvent {
        StorageEvent {
            key: key.to_string(),
            old_value: None,
            new_value: new_value.map(str::to_string),
            origin: origin.id(),
        }
    }

    #[test]
    fn test_removal_elsewhere_ends_without_rewriting() {
        let shared = SharedStore::open_in_memory().unwrap();
        let clock = ManualClock::new(NOW);
        let a = open_tab(shared.context(), &clock);
        let b = open_tab(shared.context(), &clock);
        let observer = shared.context();

        a.machine.start(&UserProfile::new("alice"), "tok-1").unwrap();
        b.sync.process_pending();
        assert!(b.machine.state().is_active());

        let mut watched = observer.subscribe();
        a.machine.end(EndReason::Logout).unwrap();
        let (_, mut b_changes) = b.machine.notifier().subscribe_channel();
        b.sync.process_pending();

        let change = b_changes.try_recv().unwrap();
        assert_eq!(change.reason, Some(EndReason::EndedInOtherTab));
        assert!(!b.machine.is_active());

        // Only A's three removals were ever written.
        let writes: Vec<StorageEvent> = std::iter::from_fn(|| watched.try_next()).collect();
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|e| e.origin != b.machine.store().context_id()));
    }

    #[test]
    fn test_token_events_only_act_on_a_change_of_state() {
        let shared = SharedStore::open_in_memory().unwrap();
        let clock = ManualClock::new(NOW);
        let tab = open_tab(shared.context(), &clock);
        let other = shared.context();

        assert_eq!(
            tab.sync.handle(&event("jobprep_token", None, &other)),
            SyncAction::Ignored
        );
        // A token broadcast with nothing valid behind it is not adopted.
        assert_eq!(
            tab.sync.handle(&event("jobprep_token", Some("tok-1"), &other)),
            SyncAction::Ignored
        );
        assert_eq!(
            tab.sync.handle(&event("jobprep_user", Some("{}"), &other)),
            SyncAction::Ignored
        );
    }

    #[test]
    fn test_last_activity_broadcast_is_merged() {
        let shared = SharedStore::open_in_memory().unwrap();
        let clock = ManualClock::new(NOW);
        let tab = open_tab(shared.context(), &clock);
        let other = shared.context();
        let later = (NOW + 5_000).to_string();

        assert_eq!(
            tab.sync.handle(&event("jobprep_last_active", Some(&later), &other)),
            SyncAction::ActivityMerged(NOW + 5_000)
        );
        assert_eq!(
            tab.sync.handle(&event("jobprep_last_active", Some("garbage"), &other)),
            SyncAction::Ignored
        );
        assert_eq!(tab.machine.last_activity_at(), NOW + 5_000);
    }

    #[test]
    fn test_detached_synchronizer_receives_nothing() {
        let shared = SharedStore::open_in_memory().unwrap();
        let clock = ManualClock::new(NOW);
        let tab = open_tab(shared.context(), &clock);
        tab.sync.detach();

        shared.context().set("jobprep_token", "tok-1").unwrap();
        assert_eq!(tab.sync.process_pending(), 0);
        assert!(!tab.sync.is_attached());
    }
}
