//! Guarded, indicated, non-blocking action dispatch.
//!
//! Every run is composed the same way:
//! `with_indicator(action.indicator(), || guard(key, || action.run(trigger)))`.
//! `dispatch` puts that composition on a fresh thread so the caller (an event
//! source loop or a bus subscriber) returns immediately. Those threads are
//! counted so shutdown can give running backups a bounded time to finish.

use crate::action::{Action, ActionKey, Trigger};
use crate::error::CoreError;
use crate::guard::ActionGuard;
use crate::indicator::BusyIndicator;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// How one action run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Another run of the same action was in progress.
    Skipped,
    /// The action returned an error or panicked. Already logged.
    Failed,
}

/// Number of dispatched workers still running.
///
/// # Lock Invariant (running)
///
/// Incremented before a worker is spawned and decremented when it exits,
/// including by unwinding. Waiters sleep on `idle` until it reaches zero.
#[derive(Debug, Default)]
struct InFlight {
    running: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(&self) {
        *self.running.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn leave(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        *running = running.saturating_sub(1);
        if *running == 0 {
            self.idle.notify_all();
        }
    }

    fn count(&self) -> usize {
        *self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        while *running > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            running = match self.idle.wait_timeout(running, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *running
    }
}

struct LeaveOnDrop(Arc<InFlight>);

impl Drop for LeaveOnDrop {
    fn drop(&mut self) {
        self.0.leave();
    }
}

pub struct Dispatcher {
    guard: ActionGuard,
    indicator: BusyIndicator,
    actions: HashMap<ActionKey, Arc<dyn Action>>,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    pub fn new(indicator: BusyIndicator) -> Self {
        Self {
            guard: ActionGuard::new(),
            indicator,
            actions: HashMap::new(),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Register an action under its own key, replacing any earlier one.
    pub fn register(&mut self, action: Arc<dyn Action>) -> &mut Self {
        self.actions.insert(action.key(), action);
        self
    }

    pub fn contains(&self, key: ActionKey) -> bool {
        self.actions.contains_key(&key)
    }

    pub fn is_running(&self, key: ActionKey) -> bool {
        self.guard.is_running(key)
    }

    pub fn indicator(&self) -> &BusyIndicator {
        &self.indicator
    }

    /// Start `key` on a new thread and return at once.
    pub fn dispatch(
        self: &Arc<Self>,
        key: ActionKey,
        trigger: Trigger,
    ) -> Result<JoinHandle<Outcome>, CoreError> {
        let action = self.action(key)?;
        let dispatcher = Arc::clone(self);
        let name = format!("action-{}", key);

        self.in_flight.enter();
        let leave = LeaveOnDrop(Arc::clone(&self.in_flight));
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _leave = leave;
                dispatcher.execute(action.as_ref(), &trigger)
            })
            .map_err(|source| CoreError::Spawn { name, source })
    }

    /// Number of dispatched workers that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Wait up to `timeout` for every dispatched worker to finish. Returns how
    /// many are still running; those are left to run on.
    pub fn join_in_flight(&self, timeout: Duration) -> usize {
        let remaining = self.in_flight.wait_idle(timeout);
        if remaining > 0 {
            debug!(remaining, ?timeout, "Actions still running after join bound");
        }
        remaining
    }

    /// Run `key` on the calling thread (its body still runs on the indicator's
    /// worker). Used by the main loop for the debounced catalog sync.
    pub fn run_blocking(&self, key: ActionKey, trigger: &Trigger) -> Result<Outcome, CoreError> {
        let action = self.action(key)?;
        Ok(self.execute(action.as_ref(), trigger))
    }

    fn action(&self, key: ActionKey) -> Result<Arc<dyn Action>, CoreError> {
        self.actions
            .get(&key)
            .cloned()
            .ok_or_else(|| CoreError::UnknownAction(key.to_string()))
    }

    fn execute(&self, action: &dyn Action, trigger: &Trigger) -> Outcome {
        let key = action.key();
        let supervised = self
            .indicator
            .with_indicator(action.indicator(), || {
                self.guard.guard(key, || action.run(trigger))
            });

        match supervised {
            Ok(Ok(Some(Ok(())))) => {
                info!(action = %key, "{} finished", key);
                Outcome::Completed
            }
            Ok(Ok(None)) => Outcome::Skipped,
            Ok(Ok(Some(Err(e)))) => {
                error!(action = %key, ?trigger, "{} failed: {:#}", key, e);
                Outcome::Failed
            }
            Ok(Err(panic)) => {
                error!(action = %key, ?trigger, "{} panicked: {}", key, panic);
                Outcome::Failed
            }
            Err(e) => {
                error!(action = %key, "Could not start worker for {}: {}", key, e);
                Outcome::Failed
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.actions.keys().collect();
        keys.sort();
        f.debug_struct("Dispatcher")
            .field("actions", &keys)
            .field("indicator", &self.indicator)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
