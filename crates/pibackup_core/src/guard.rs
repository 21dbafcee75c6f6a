//! Non-blocking per-action exclusivity.
//!
//! A second invocation of a running action is dropped, not queued. The next
//! trigger (file event, poll tick) re-invokes it later.

use crate::action::ActionKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// One try-acquire slot per action key.
///
/// # Lock Invariant (slots)
///
/// The map lock is held only to look up or insert a slot, never while the
/// guarded body runs. The slot itself is a lock-free AtomicBool.
#[derive(Debug, Default)]
pub struct ActionGuard {
    slots: Mutex<HashMap<ActionKey, Arc<AtomicBool>>>,
}

impl ActionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` unless another invocation for `key` is executing.
    ///
    /// Returns `None` without running `body` when the action is busy. The slot
    /// is released on every exit path, including unwinding, before returning.
    pub fn guard<R>(&self, key: ActionKey, body: impl FnOnce() -> R) -> Option<R> {
        let slot = self.slot(key);
        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(action = %key, "Skipping {}, already running", key);
            return None;
        }

        let _release = SlotRelease(&slot);
        Some(body())
    }

    /// Whether an invocation for `key` currently holds the slot.
    pub fn is_running(&self, key: ActionKey) -> bool {
        self.slot(key).load(Ordering::Acquire)
    }

    fn slot(&self, key: ActionKey) -> Arc<AtomicBool> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key).or_default())
    }
}

struct SlotRelease<'a>(&'a AtomicBool);

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const BACKUP: ActionKey = ActionKey::new("storage-backup");
    const SYNC: ActionKey = ActionKey::new("catalog-sync");

    #[test]
    fn test_guard_runs_body_when_idle() {
        let guard = ActionGuard::new();
        assert_eq!(guard.guard(BACKUP, || 7), Some(7));
        assert!(!guard.is_running(BACKUP));
    }

    #[test]
    fn test_concurrent_invocation_is_skipped_without_blocking() {
        let guard = Arc::new(ActionGuard::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                guard.guard(BACKUP, || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
            })
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let mut ran = false;
        assert!(guard.guard(BACKUP, || ran = true).is_none());
        assert!(!ran);

        release_tx.send(()).unwrap();
        assert!(holder.join().unwrap().is_some());
        assert!(guard.guard(BACKUP, || ()).is_some());
    }

    #[test]
    fn test_keys_are_independent() {
        let guard = ActionGuard::new();
        let nested = guard.guard(BACKUP, || guard.guard(SYNC, || "inner"));
        assert_eq!(nested, Some(Some("inner")));
    }

    #[test]
    fn test_slot_released_after_error() {
        let guard = ActionGuard::new();
        let result: Option<Result<(), String>> = guard.guard(BACKUP, || Err("rsync failed".into()));
        assert_eq!(result, Some(Err("rsync failed".to_string())));
        assert!(!guard.is_running(BACKUP));
    }

    #[test]
    fn test_slot_released_after_panic() {
        let guard = ActionGuard::new();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard.guard(BACKUP, || panic!("boom"))
        }));
        assert!(caught.is_err());
        assert!(!guard.is_running(BACKUP));
    }
}
