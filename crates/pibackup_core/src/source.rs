//! Event source lifecycle and the thread helper the sources share.

use crate::error::SourceError;
use crate::indicator::panic_message;
use crate::signal::StopToken;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a bounded join re-checks the thread.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// An independent watcher running its own listening loop.
///
/// `stop` must be idempotent and safe to call when `start` failed or was never
/// called. `join` never blocks longer than `timeout`.
pub trait EventSource: Send {
    fn name(&self) -> &str;

    fn start(&mut self) -> Result<(), SourceError>;

    fn stop(&self);

    fn join(&mut self, timeout: Duration) -> Result<(), SourceError>;
}

/// A named listening thread with a stop token and a bounded join.
#[derive(Debug)]
pub struct SourceThread {
    name: String,
    stop: StopToken,
    handle: Option<JoinHandle<()>>,
}

impl SourceThread {
    /// Spawn `body` on a thread named `name`. The body must return soon after
    /// its token is stopped.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, SourceError>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let stop = StopToken::new();
        let token = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait up to `timeout` for the thread to exit.
    ///
    /// On timeout the thread is left running and may linger past shutdown.
    /// Joining from the thread itself is skipped instead of deadlocking.
    pub fn join(&mut self, timeout: Duration) -> Result<(), SourceError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if handle.thread().id() == thread::current().id() {
            debug!(source = %self.name, "Join requested from the source's own thread, skipping");
            self.handle = Some(handle);
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                self.handle = Some(handle);
                return Err(SourceError::JoinTimeout {
                    source_name: self.name.clone(),
                    timeout,
                });
            }
            thread::sleep(JOIN_POLL);
        }

        handle.join().map_err(|payload| {
            warn!(
                source = %self.name,
                "Source thread panicked: {}",
                panic_message(payload.as_ref())
            );
            SourceError::Panicked {
                source_name: self.name.clone(),
            }
        })
    }
}

/// Shared `stop`/`join` behaviour for sources holding an optional thread.
pub fn stop_thread(thread: &Option<SourceThread>) {
    if let Some(thread) = thread {
        thread.stop();
    }
}

pub fn join_thread(thread: &mut Option<SourceThread>, timeout: Duration) -> Result<(), SourceError> {
    match thread {
        Some(thread) => thread.join(timeout),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_then_join_within_bound() {
        let mut thread = SourceThread::spawn("test-loop", |stop| {
            while !stop.is_stopped() {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        thread.stop();
        thread.join(Duration::from_secs(2)).unwrap();
        assert!(thread.is_finished());
        // Joining again is a no-op.
        thread.join(Duration::from_millis(1)).unwrap();
    }

    #[test]
    fn test_join_times_out_on_stuck_thread() {
        let mut thread = SourceThread::spawn("stuck-loop", |_stop| {
            thread::sleep(Duration::from_millis(300));
        })
        .unwrap();

        thread.stop();
        let start = Instant::now();
        let err = thread.join(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, SourceError::JoinTimeout { .. }));
        assert!(start.elapsed() < Duration::from_millis(250));

        // The lingering thread can still be collected later.
        thread.join(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_join_reports_panic() {
        let mut thread = SourceThread::spawn("panicky-loop", |_stop| panic!("watch died")).unwrap();
        let err = thread.join(Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, SourceError::Panicked { .. }));
    }

    #[test]
    fn test_self_join_is_skipped() {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel::<SourceThread>();
        let (result_tx, result_rx) = std::sync::mpsc::channel();
        let mut outer = SourceThread::spawn("self-join", move |_stop| {
            let mut me = handle_rx.recv().unwrap();
            let start = Instant::now();
            let joined = me.join(Duration::from_secs(5));
            result_tx.send((joined.is_ok(), start.elapsed())).unwrap();
        })
        .unwrap();

        let inner = SourceThread {
            name: outer.name.clone(),
            stop: outer.stop.clone(),
            handle: outer.handle.take(),
        };
        handle_tx.send(inner).unwrap();

        let (joined, elapsed) = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(joined);
        assert!(elapsed < Duration::from_secs(1));
    }
}
