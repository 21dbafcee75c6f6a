//! PiBackup Core - Event Orchestration Layer
//!
//! Independent event sources (mount watcher, shared-directory watcher, USB hotplug,
//! touch pads) are funneled into a small set of long-running, mutually-exclusive
//! actions. Actual copying is delegated to collaborators; this crate only decides
//! *when* and *whether* an action runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────┐     ┌────────────┐     ┌──────────────────────────┐
//! │ EventSource │────▶│ EventBus │────▶│ routes     │────▶│ Dispatcher (new thread)  │
//! │ (own thread)│     │          │     │ (app crate)│     │  BusyIndicator           │
//! └─────────────┘     └──────────┘     └────────────┘     │   └─ ActionGuard         │
//!                                            │            │       └─ Action::run     │
//!                                            ▼            └──────────────────────────┘
//!                                   DebounceScheduler ◀── polled by the main loop
//! ```
//!
//! # Core Concepts
//!
//! - **Action**: named unit of work, at most one running instance per [`ActionKey`]
//! - **Indicator**: LED pulsed while an action runs, always off afterwards
//! - **Debounce**: bursts of triggers collapse into one run at last trigger + delay
//! - **Shutdown**: first request wins, sources joined with a bound, indicators off

pub mod action;
pub mod bus;
pub mod clock;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod indicator;
pub mod long_press;
pub mod shutdown;
pub mod signal;
pub mod source;

// Re-exports for convenience
pub use action::{Action, ActionKey, Trigger};
pub use bus::{ButtonEvent, ButtonId, ButtonPhase, DeviceClass, Event, EventBus, UsbDevice};
pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::DebounceScheduler;
pub use dispatcher::{Dispatcher, Outcome};
pub use error::{CoreError, SourceError};
pub use guard::ActionGuard;
pub use indicator::{panic_message, BusyIndicator, IndicatorId, IndicatorPanel};
pub use long_press::LongPressDetector;
pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownState};
pub use signal::{ExitSignal, StopToken};
pub use source::{EventSource, SourceThread};
