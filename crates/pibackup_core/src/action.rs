//! Actions and the triggers that start them.

use crate::bus::{ButtonId, UsbDevice};
use crate::indicator::IndicatorId;
use std::fmt;
use std::path::PathBuf;

/// Stable identity of an action. One exclusivity slot exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey(&'static str);

impl ActionKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// What caused an action run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A storage volume appeared at this path.
    Volume(PathBuf),
    /// A USB device arrived.
    Device(UsbDevice),
    /// A touch pad was released.
    Button(ButtonId),
    /// The debounce scheduler came due.
    Scheduled,
}

/// A named, idempotent unit of work.
///
/// Implementations block for as long as the work takes; the dispatcher runs
/// them on dedicated threads.
pub trait Action: Send + Sync {
    fn key(&self) -> ActionKey;

    /// Indicator pulsed while this action runs.
    fn indicator(&self) -> IndicatorId;

    fn run(&self, trigger: &Trigger) -> anyhow::Result<()>;
}
