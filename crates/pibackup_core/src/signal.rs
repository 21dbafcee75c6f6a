//! Process-wide exit signal and per-source stop tokens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Token for cooperative stopping of a single event source loop.
///
/// Uses an AtomicBool internally. Clone is cheap and shares state.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Process-wide exit flag. Write-once effective: only the first `set` changes it.
///
/// Loops either poll [`ExitSignal::is_set`] or sleep on [`ExitSignal::wait_timeout`],
/// which returns as soon as the signal is raised.
#[derive(Debug, Clone, Default)]
pub struct ExitSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns true only for the call that actually raised it.
    pub fn set(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut raised = lock.lock().unwrap_or_else(|e| e.into_inner());
        if *raised {
            return false;
        }
        *raised = true;
        cvar.notify_all();
        true
    }

    pub fn is_set(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep up to `timeout`, waking early if the signal is raised.
    /// Returns whether the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut raised = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            raised = match cvar.wait_timeout(raised, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_exit_signal_set_is_write_once() {
        let exit = ExitSignal::new();
        assert!(!exit.is_set());
        assert!(exit.set());
        assert!(!exit.set());
        assert!(exit.is_set());
    }

    #[test]
    fn test_wait_timeout_wakes_on_set() {
        let exit = ExitSignal::new();
        let setter = exit.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            setter.set();
        });

        assert!(exit.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires_without_set() {
        let exit = ExitSignal::new();
        assert!(!exit.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_stop_token_shared_between_clones() {
        let token = StopToken::new();
        let clone = token.clone();
        clone.stop();
        assert!(token.is_stopped());
    }
}
