//! Coordinated graceful shutdown.
//!
//! `Running -> Stopping -> Stopped`. The first request raises the exit signal,
//! stops every adopted source, joins each one with a bound and finally turns
//! every indicator off. Later requests return immediately.

use crate::error::SourceError;
use crate::indicator::IndicatorPanel;
use crate::signal::ExitSignal;
use crate::source::EventSource;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Stopping,
    Stopped,
}

/// Who asked for the shutdown. Only the first request's reason is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM.
    Signal,
    /// Long press on the power pad; the process powers the device off after
    /// shutting down.
    PowerButton,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => f.write_str("signal"),
            Self::PowerButton => f.write_str("power button"),
        }
    }
}

#[derive(Debug)]
struct Progress {
    state: ShutdownState,
    reason: Option<ShutdownReason>,
}

/// Owns the exit signal and every running event source.
///
/// # Lock Invariant
///
/// `progress` is held only to read or advance the state, never while sources
/// are stopped or joined. `sources` is held while sources are joined, so
/// `adopt` from another thread waits for the joins to finish.
pub struct ShutdownCoordinator {
    progress: Mutex<Progress>,
    stopped: Condvar,
    exit: ExitSignal,
    sources: Mutex<Vec<Box<dyn EventSource>>>,
    panel: Arc<dyn IndicatorPanel>,
    join_timeout: Duration,
}

impl ShutdownCoordinator {
    pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(panel: Arc<dyn IndicatorPanel>, join_timeout: Duration) -> Self {
        Self {
            progress: Mutex::new(Progress {
                state: ShutdownState::Running,
                reason: None,
            }),
            stopped: Condvar::new(),
            exit: ExitSignal::new(),
            sources: Mutex::new(Vec::new()),
            panel,
            join_timeout,
        }
    }

    /// The process-wide exit signal raised by the first shutdown request.
    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    pub fn state(&self) -> ShutdownState {
        self.progress().state
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.progress().reason
    }

    /// Start `source` and take ownership of it.
    ///
    /// A source that fails to start is logged and kept anyway, so shutdown can
    /// stop and join every source the same way. Returns whether it started.
    pub fn launch(&self, mut source: Box<dyn EventSource>) -> bool {
        let started = match source.start() {
            Ok(()) => {
                info!(source = source.name(), "Event source started");
                true
            }
            Err(e) => {
                error!(source = source.name(), "Event source not started: {}", e);
                false
            }
        };
        self.adopt(source);
        started
    }

    /// Hand an event source over for shutdown. A source adopted after
    /// shutdown began is stopped and joined right away.
    pub fn adopt(&self, mut source: Box<dyn EventSource>) {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        if self.state() != ShutdownState::Running {
            source.stop();
            self.join_source(source.as_mut());
        }
        sources.push(source);
    }

    /// Request shutdown. Only the first call does the work and returns true;
    /// every other call returns false immediately, even while the first is
    /// still joining sources.
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        {
            let mut progress = self.progress();
            if progress.state != ShutdownState::Running {
                debug!(%reason, state = ?progress.state, "Shutdown already requested");
                return false;
            }
            progress.state = ShutdownState::Stopping;
            progress.reason = Some(reason);
        }
        info!("Shutting down ({})", reason);

        self.exit.set();

        {
            let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
            for source in sources.iter() {
                source.stop();
            }
            for source in sources.iter_mut() {
                self.join_source(source.as_mut());
            }
        }

        self.panel.all_off();

        self.progress().state = ShutdownState::Stopped;
        self.stopped.notify_all();
        info!("Shutdown complete");
        true
    }

    /// Block until the shutdown work has finished or `timeout` elapses.
    /// Returns whether the coordinator reached `Stopped`.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.progress();
        while progress.state != ShutdownState::Stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            progress = match self.stopped.wait_timeout(progress, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn join_source(&self, source: &mut dyn EventSource) {
        match source.join(self.join_timeout) {
            Ok(()) => debug!(source = source.name(), "Event source joined"),
            Err(e @ SourceError::JoinTimeout { .. }) => {
                warn!("{}, continuing shutdown", e)
            }
            Err(e) => warn!(source = source.name(), "Event source join failed: {}", e),
        }
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("progress", &*self.progress())
            .field("join_timeout", &self.join_timeout)
            .finish_non_exhaustive()
    }
}
