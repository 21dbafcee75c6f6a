//! Typed event bus between event sources and their subscribers.
//!
//! Subscribers are registered explicitly at startup and called on the
//! publishing source's thread, so they must return promptly: schedule, spawn,
//! or record, never run an action inline.

use crate::indicator::{panic_message, IndicatorId};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::error;

/// Name of a touch pad. Pads and their LEDs share names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ButtonId(&'static str);

impl ButtonId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// The LED that sits under this pad.
    pub const fn indicator(&self) -> IndicatorId {
        IndicatorId::new(self.0)
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPhase {
    Touch,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub phase: ButtonPhase,
}

impl ButtonEvent {
    pub fn touch(button: ButtonId) -> Self {
        Self {
            button,
            phase: ButtonPhase::Touch,
        }
    }

    pub fn release(button: ButtonId) -> Self {
        Self {
            button,
            phase: ButtonPhase::Release,
        }
    }
}

/// A USB device as seen by the hotplug source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbDevice {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}: ID {:04x}:{:04x}",
            self.bus, self.address, self.vendor_id, self.product_id
        )
    }
}

/// What kind of backup an arriving device calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Gps,
    Camera,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A storage volume appeared in the mount-event directory.
    VolumeMounted(PathBuf),
    /// Something changed inside the shared backup tree.
    ShareChanged(PathBuf),
    DeviceArrived { device: UsbDevice, class: DeviceClass },
    DeviceLeft(UsbDevice),
    Button(ButtonEvent),
}

type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

/// Fan-out of events to every subscriber in registration order.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(subscriber));
    }

    /// Deliver `event` to every subscriber. A panicking subscriber is logged and
    /// skipped so the publishing loop keeps running.
    pub fn publish(&self, event: Event) {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        for subscriber in subscribers.iter() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| subscriber(&event))) {
                error!(
                    ?event,
                    "Event subscriber panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
