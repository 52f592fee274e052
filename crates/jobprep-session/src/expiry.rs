//! Expiry Clock
//!
//! One poll checks both termination conditions: the sliding inactivity
//! window and the absolute deadline. Termination lags the nominal deadline
//! by up to one poll period.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::duration_ms;
use crate::machine::SessionMachine;
use crate::notifier::{EndReason, SessionEventKind};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing changed
    Idle,
    /// This tick ended the session
    Ended(EndReason),
    /// The cached state caught up with the store
    Reconciled(SessionEventKind),
}

#[derive(Clone)]
pub struct ExpiryClock {
    machine: Arc<SessionMachine>,
    period: Duration,
}

impl ExpiryClock {
    pub fn new(machine: Arc<SessionMachine>) -> Self {
        let period = machine.config().activity_check_interval;
        Self { machine, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn tick(&self) -> Result<TickOutcome> {
        let machine = &self.machine;

        if machine.state().is_active()
            && !machine.is_active()
            && machine.store().token()?.is_some()
        {
            tracing::info!("Session deadline passed, ending session");
            return Ok(ended(machine.end(EndReason::Expired)?.is_some(), EndReason::Expired));
        }

        // Adopt a session this context has not observed yet, so that ending
        // it below is announced here too.
        let reconciled = machine.check_session();

        if machine.is_active() {
            let idle = machine.idle_for();
            if idle > duration_ms(machine.config().inactivity_timeout) {
                tracing::info!(idle_ms = idle, "Inactivity timeout reached, ending session");
                return Ok(ended(machine.end(EndReason::Inactivity)?.is_some(), EndReason::Inactivity));
            }
        }

        Ok(match reconciled {
            Some(change) => TickOutcome::Reconciled(change.event),
            None => TickOutcome::Idle,
        })
    }
}

fn ended(notified: bool, reason: EndReason) -> TickOutcome {
    if notified {
        TickOutcome::Ended(reason)
    } else {
        TickOutcome::Idle
    }
}
