//! PiBackup Test Utilities
//!
//! Fakes for the seams of `pibackup_core`, shared by integration tests.
//!
//! ```rust,ignore
//! use pibackup_test_utils::{RecordingPanel, ScriptedSource, wait_until};
//!
//! let panel = RecordingPanel::new();
//! let source = ScriptedSource::new("mount-watcher");
//! let counters = source.counters();
//! coordinator.launch(Box::new(source));
//! coordinator.shutdown(ShutdownReason::Signal);
//! assert_eq!(counters.stops(), 1);
//! ```

use pibackup_core::{EventSource, IndicatorId, IndicatorPanel, SourceError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Indicator panel that records every transition.
#[derive(Debug, Default)]
pub struct RecordingPanel {
    writes: Mutex<Vec<(IndicatorId, bool)>>,
    all_off_calls: AtomicUsize,
}

impl RecordingPanel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every transition in order. `all_off` records an off for each indicator
    /// seen so far.
    pub fn writes(&self) -> Vec<(IndicatorId, bool)> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn writes_for(&self, id: IndicatorId) -> Vec<bool> {
        self.writes()
            .into_iter()
            .filter(|(written, _)| *written == id)
            .map(|(_, on)| on)
            .collect()
    }

    /// Last state written for `id`, if it was ever written.
    pub fn last(&self, id: IndicatorId) -> Option<bool> {
        self.writes_for(id).last().copied()
    }

    /// Current state per indicator.
    pub fn states(&self) -> HashMap<IndicatorId, bool> {
        let mut states = HashMap::new();
        for (id, on) in self.writes() {
            states.insert(id, on);
        }
        states
    }

    pub fn all_off_calls(&self) -> usize {
        self.all_off_calls.load(Ordering::SeqCst)
    }
}

impl IndicatorPanel for RecordingPanel {
    fn set(&self, id: IndicatorId, on: bool) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, on));
    }

    fn all_off(&self) {
        self.all_off_calls.fetch_add(1, Ordering::SeqCst);
        let mut writes = self.writes.lock().unwrap_or_else(|e| e.into_inner());
        let ids: Vec<IndicatorId> = writes.iter().map(|(id, _)| *id).collect();
        for id in ids {
            writes.push((id, false));
        }
    }
}

/// Counters shared between a [`ScriptedSource`] and the test that owns it.
#[derive(Debug, Default)]
pub struct SourceCounters {
    starts: AtomicUsize,
    stops: AtomicUsize,
    joins: AtomicUsize,
}

impl SourceCounters {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

/// Event source with scripted lifecycle behaviour.
///
/// By default it starts, stops and joins instantly. `failing_start` makes
/// `start` return [`SourceError::Unavailable`]; `ignoring_stop` makes `join`
/// wait out its whole timeout and report [`SourceError::JoinTimeout`].
#[derive(Debug)]
pub struct ScriptedSource {
    name: String,
    fail_start: bool,
    ignore_stop: bool,
    stopped: AtomicBool,
    counters: Arc<SourceCounters>,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_start: false,
            ignore_stop: false,
            stopped: AtomicBool::new(false),
            counters: Arc::new(SourceCounters::default()),
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn ignoring_stop(mut self) -> Self {
        self.ignore_stop = true;
        self
    }

    pub fn counters(&self) -> Arc<SourceCounters> {
        Arc::clone(&self.counters)
    }
}

impl EventSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), SourceError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(SourceError::unavailable(&self.name, "scripted start failure"));
        }
        Ok(())
    }

    fn stop(&self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn join(&mut self, timeout: Duration) -> Result<(), SourceError> {
        self.counters.joins.fetch_add(1, Ordering::SeqCst);
        if self.ignore_stop || !self.stopped.load(Ordering::SeqCst) {
            thread::sleep(timeout);
            debug!(source = %self.name, "Scripted source did not stop");
            return Err(SourceError::JoinTimeout {
                source_name: self.name.clone(),
                timeout,
            });
        }
        Ok(())
    }
}

/// Poll `predicate` every 5 ms until it holds or `timeout` elapses.
/// Returns the final result of the predicate.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: IndicatorId = IndicatorId::new("A");
    const B: IndicatorId = IndicatorId::new("B");

    #[test]
    fn test_recording_panel_all_off() {
        let panel = RecordingPanel::new();
        panel.set(A, true);
        panel.set(B, true);
        panel.all_off();

        assert_eq!(panel.all_off_calls(), 1);
        assert_eq!(panel.last(A), Some(false));
        assert!(panel.states().values().all(|on| !on));
    }

    #[test]
    fn test_scripted_source_lifecycle() {
        let mut source = ScriptedSource::new("scripted");
        let counters = source.counters();
        source.start().unwrap();
        source.stop();
        source.join(Duration::from_secs(1)).unwrap();
        assert_eq!((counters.starts(), counters.stops(), counters.joins()), (1, 1, 1));

        let mut stuck = ScriptedSource::new("stuck").ignoring_stop();
        stuck.stop();
        assert!(matches!(
            stuck.join(Duration::from_millis(10)),
            Err(SourceError::JoinTimeout { .. })
        ));

        let mut broken = ScriptedSource::new("broken").failing_start();
        assert!(broken.start().is_err());
    }

    #[test]
    fn test_wait_until() {
        let start = Instant::now();
        assert!(wait_until(Duration::from_secs(1), || start.elapsed() > Duration::from_millis(20)));
        assert!(!wait_until(Duration::from_millis(20), || false));
    }
}
