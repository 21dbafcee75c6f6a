//! Busy indicator: pulse an LED while work runs on a worker thread.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Name of a visual indicator (one LED per touch pad).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndicatorId(&'static str);

impl IndicatorId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for IndicatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// LED driver seam. Implementations must not block for long; failures are
/// theirs to log.
pub trait IndicatorPanel: Send + Sync {
    fn set(&self, id: IndicatorId, on: bool);

    fn off(&self, id: IndicatorId) {
        self.set(id, false);
    }

    /// Turn every known indicator off.
    fn all_off(&self);
}

/// Outcome of the supervised body: its value, or the panic message.
pub type Supervised<R> = Result<R, String>;

/// Runs a body on a worker thread and toggles an indicator until it finishes.
pub struct BusyIndicator {
    panel: std::sync::Arc<dyn IndicatorPanel>,
    interval: Duration,
}

impl BusyIndicator {
    /// Default pulse interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(panel: std::sync::Arc<dyn IndicatorPanel>, interval: Duration) -> Self {
        Self { panel, interval }
    }

    pub fn panel(&self) -> &std::sync::Arc<dyn IndicatorPanel> {
        &self.panel
    }

    /// Run `body` on a worker thread, toggling `id` every interval while it is
    /// alive. Blocks until the worker finishes. The indicator is switched off
    /// exactly once afterwards, whether the body returned or panicked.
    ///
    /// A panic in `body` is returned as `Err(message)` after the indicator is off.
    pub fn with_indicator<R, F>(&self, id: IndicatorId, body: F) -> std::io::Result<Supervised<R>>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        thread::scope(|scope| {
            let (done_tx, done_rx) = mpsc::channel::<()>();
            let worker = thread::Builder::new()
                .name(format!("busy-{}", id))
                .spawn_scoped(scope, move || {
                    // Dropped on return or unwind, which wakes the supervisor.
                    let _done = done_tx;
                    body()
                })?;

            let mut led_on = true;
            loop {
                self.panel.set(id, led_on);
                led_on = !led_on;
                match done_rx.recv_timeout(self.interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            let joined = worker.join();
            self.panel.off(id);
            debug!(indicator = %id, "Indicator off");
            Ok(joined.map_err(|payload| panic_message(payload.as_ref())))
        })
    }
}

impl fmt::Debug for BusyIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusyIndicator")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Text of a panic payload, for logging.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const LED: IndicatorId = IndicatorId::new("A");

    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<(IndicatorId, bool)>>,
    }

    impl IndicatorPanel for Recorder {
        fn set(&self, id: IndicatorId, on: bool) {
            self.writes.lock().unwrap().push((id, on));
        }

        fn all_off(&self) {}
    }

    fn indicator(recorder: &Arc<Recorder>) -> BusyIndicator {
        BusyIndicator::new(recorder.clone(), Duration::from_millis(10))
    }

    #[test]
    fn test_returns_body_value_and_ends_off() {
        let recorder = Arc::new(Recorder::default());
        let result = indicator(&recorder).with_indicator(LED, || 42).unwrap();
        assert_eq!(result, Ok(42));

        let writes = recorder.writes.lock().unwrap();
        assert_eq!(writes.first(), Some(&(LED, true)));
        assert_eq!(writes.last(), Some(&(LED, false)));
    }

    #[test]
    fn test_pulses_while_body_runs() {
        let recorder = Arc::new(Recorder::default());
        indicator(&recorder)
            .with_indicator(LED, || thread::sleep(Duration::from_millis(120)))
            .unwrap()
            .unwrap();

        let writes = recorder.writes.lock().unwrap();
        let ons = writes.iter().filter(|(_, on)| *on).count();
        let offs = writes.iter().filter(|(_, on)| !*on).count();
        assert!(ons >= 2, "expected several pulses, got {:?}", *writes);
        assert!(offs >= 2);
        assert_eq!(writes.last(), Some(&(LED, false)));
    }

    #[test]
    fn test_panicking_body_still_turns_indicator_off() {
        let recorder = Arc::new(Recorder::default());
        let result: Supervised<()> = indicator(&recorder)
            .with_indicator(LED, || panic!("camera vanished"))
            .unwrap();

        assert_eq!(result, Err("camera vanished".to_string()));
        assert_eq!(recorder.writes.lock().unwrap().last(), Some(&(LED, false)));
    }

    #[test]
    fn test_error_result_is_passed_through() {
        let recorder = Arc::new(Recorder::default());
        let result = indicator(&recorder)
            .with_indicator(LED, || Err::<(), _>("no space left"))
            .unwrap();
        assert_eq!(result, Ok(Err("no space left")));
        assert_eq!(recorder.writes.lock().unwrap().last(), Some(&(LED, false)));
    }
}
