//! Long-press detection on a single touch pad.
//!
//! `Idle -> Touched -> Idle`. Touch records the time (a repeated touch simply
//! overwrites it); release clears it and fires the handler only when the pad
//! was held for at least the threshold.

use crate::bus::{ButtonEvent, ButtonId};
use crate::clock::{Clock, SystemClock};
use crate::indicator::IndicatorPanel;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

type Handler = Box<dyn Fn(&ButtonEvent) + Send + Sync>;

pub struct LongPressDetector {
    button: ButtonId,
    threshold: Duration,
    default_state: bool,
    panel: Arc<dyn IndicatorPanel>,
    clock: Arc<dyn Clock>,
    touched_at: Mutex<Option<Instant>>,
    handler: Handler,
}

impl LongPressDetector {
    pub fn new<F>(
        button: ButtonId,
        threshold: Duration,
        default_state: bool,
        panel: Arc<dyn IndicatorPanel>,
        handler: F,
    ) -> Self
    where
        F: Fn(&ButtonEvent) + Send + Sync + 'static,
    {
        Self {
            button,
            threshold,
            default_state,
            panel,
            clock: Arc::new(SystemClock),
            touched_at: Mutex::new(None),
            handler: Box::new(handler),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn button(&self) -> ButtonId {
        self.button
    }

    pub fn on_touch(&self) {
        let now = self.clock.now();
        *self.touched_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
    }

    /// Handle a release. Returns whether the long-press handler ran.
    pub fn on_release(&self, event: &ButtonEvent) -> bool {
        let Some(touched_at) = self
            .touched_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return false;
        };

        let held = self.clock.now().saturating_duration_since(touched_at);
        self.panel.set(self.button.indicator(), self.default_state);

        if held < self.threshold {
            debug!(button = %self.button, ?held, "Short press ignored");
            return false;
        }
        (self.handler)(event);
        true
    }

    /// Route a touch-pad event for this detector's pad.
    pub fn handle(&self, event: &ButtonEvent) -> bool {
        if event.button != self.button {
            return false;
        }
        match event.phase {
            crate::bus::ButtonPhase::Touch => {
                self.on_touch();
                false
            }
            crate::bus::ButtonPhase::Release => self.on_release(event),
        }
    }

    pub fn is_touched(&self) -> bool {
        self.touched_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl std::fmt::Debug for LongPressDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongPressDetector")
            .field("button", &self.button)
            .field("threshold", &self.threshold)
            .field("touched", &self.is_touched())
            .finish()
    }
}
