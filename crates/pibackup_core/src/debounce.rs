//! Debounced deferred-action scheduling.
//!
//! Bursts of triggers (many files landing during one mirror pass) collapse into
//! a single run at *last trigger + delay*. A new request always overwrites the
//! pending one, even if that moves the due time later.

use crate::clock::{Clock, SystemClock};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

/// Holds at most one pending due time.
///
/// # Lock Invariant (next_due)
///
/// Every read, write and clear of `next_due` happens under the one mutex, and
/// each critical section is O(1).
pub struct DebounceScheduler {
    next_due: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            next_due: Mutex::new(None),
            clock,
        }
    }

    /// Set the due time to now + `delay`, replacing any pending one.
    pub fn schedule(&self, delay: Duration) {
        let due = self.clock.now() + delay;
        let mut next_due = self.next_due.lock().unwrap_or_else(|e| e.into_inner());
        *next_due = Some(due);
        drop(next_due);

        let wall = chrono::Local::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        info!(
            "Scheduling a catalog synchronization at {}",
            wall.format("%Y-%m-%d %H:%M:%S")
        );
    }

    /// If a due time is pending and has been reached, clear it and return true.
    /// Otherwise return false and leave state untouched.
    pub fn pop_due(&self) -> bool {
        let now = self.clock.now();
        let mut next_due = self.next_due.lock().unwrap_or_else(|e| e.into_inner());
        match *next_due {
            Some(due) if now >= due => {
                *next_due = None;
                true
            }
            _ => false,
        }
    }

    /// The pending due time, if any.
    pub fn pending(&self) -> Option<Instant> {
        *self.next_due.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DebounceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DebounceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("next_due", &self.pending())
            .finish()
    }
}
