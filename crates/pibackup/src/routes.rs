//! Routing table: which event starts which action.
//!
//! Routes run on the publishing adapter's thread, so every branch either
//! schedules, feeds the power-pad detector, or hands the action to a fresh
//! dispatcher thread.

use crate::actions::{CAMERA_BACKUP, CATALOG_SYNC, GPS_BACKUP, STORAGE_BACKUP};
use crate::pads;
use pibackup_core::{
    ActionKey, ButtonEvent, ButtonPhase, DebounceScheduler, DeviceClass, Dispatcher, Event,
    EventBus, IndicatorPanel, LongPressDetector, Outcome, ShutdownCoordinator, ShutdownReason,
    Trigger,
};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Routes {
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<DebounceScheduler>,
    share_debounce: Duration,
    power: LongPressDetector,
}

impl Routes {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<DebounceScheduler>,
        share_debounce: Duration,
        power: LongPressDetector,
    ) -> Self {
        Self {
            dispatcher,
            scheduler,
            share_debounce,
            power,
        }
    }

    /// Subscribe the table to `bus`.
    pub fn install(self: Arc<Self>, bus: &EventBus) {
        bus.subscribe(move |event| {
            self.route(event);
        });
    }

    /// Route one event. Returns the worker handle when an action was
    /// dispatched.
    pub fn route(&self, event: &Event) -> Option<JoinHandle<Outcome>> {
        match event {
            Event::VolumeMounted(path) => {
                info!(path = %path.display(), "Storage volume mounted");
                self.dispatch(STORAGE_BACKUP, Trigger::Volume(path.clone()))
            }
            Event::ShareChanged(_) => {
                self.scheduler.schedule(self.share_debounce);
                None
            }
            Event::DeviceArrived { device, class } => {
                info!(%device, ?class, "USB device arrived");
                let key = match class {
                    DeviceClass::Gps => GPS_BACKUP,
                    DeviceClass::Camera => CAMERA_BACKUP,
                };
                self.dispatch(key, Trigger::Device(*device))
            }
            Event::DeviceLeft(device) => {
                info!(%device, "USB device left");
                None
            }
            Event::Button(button) => self.route_button(button),
        }
    }

    fn route_button(&self, event: &ButtonEvent) -> Option<JoinHandle<Outcome>> {
        if event.button == self.power.button() {
            self.power.handle(event);
            return None;
        }
        if event.phase != ButtonPhase::Release {
            return None;
        }
        match event.button {
            pads::GPS => self.dispatch(GPS_BACKUP, Trigger::Button(event.button)),
            pads::CATALOG => self.dispatch(CATALOG_SYNC, Trigger::Button(event.button)),
            _ => None,
        }
    }

    fn dispatch(&self, key: ActionKey, trigger: Trigger) -> Option<JoinHandle<Outcome>> {
        match self.dispatcher.dispatch(key, trigger) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(action = %key, "Dispatch failed: {}", e);
                None
            }
        }
    }
}

/// Long-press detector for the power pad. A long press requests shutdown;
/// the pad's LED rests on while the controller runs.
pub fn power_button(
    threshold: Duration,
    panel: Arc<dyn IndicatorPanel>,
    coordinator: &Arc<ShutdownCoordinator>,
) -> LongPressDetector {
    let coordinator: Weak<ShutdownCoordinator> = Arc::downgrade(coordinator);
    LongPressDetector::new(pads::POWER, threshold, true, panel, move |_| {
        match coordinator.upgrade() {
            Some(coordinator) => {
                info!("Power pad held, shutting down");
                coordinator.shutdown(ShutdownReason::PowerButton);
            }
            None => warn!("Power pad held after the controller stopped"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pibackup_core::{Action, BusyIndicator, IndicatorId, ManualClock, UsbDevice};
    use pibackup_test_utils::RecordingPanel;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records the trigger of every run.
    struct RecordingAction {
        key: ActionKey,
        runs: Mutex<Vec<Trigger>>,
    }

    impl Action for RecordingAction {
        fn key(&self) -> ActionKey {
            self.key
        }

        fn indicator(&self) -> IndicatorId {
            IndicatorId::new("test")
        }

        fn run(&self, trigger: &Trigger) -> anyhow::Result<()> {
            self.runs.lock().unwrap().push(trigger.clone());
            Ok(())
        }
    }

    struct Fixture {
        routes: Routes,
        actions: Vec<Arc<RecordingAction>>,
        scheduler: Arc<DebounceScheduler>,
        clock: Arc<ManualClock>,
        coordinator: Arc<ShutdownCoordinator>,
    }

    impl Fixture {
        fn new() -> Self {
            let panel = RecordingPanel::new();
            let clock = Arc::new(ManualClock::new());
            let scheduler = Arc::new(DebounceScheduler::with_clock(clock.clone()));
            let coordinator = Arc::new(ShutdownCoordinator::new(
                panel.clone(),
                Duration::from_millis(100),
            ));

            let mut dispatcher =
                Dispatcher::new(BusyIndicator::new(panel.clone(), Duration::from_millis(10)));
            let mut actions = Vec::new();
            for key in [STORAGE_BACKUP, CAMERA_BACKUP, GPS_BACKUP, CATALOG_SYNC] {
                let action = Arc::new(RecordingAction {
                    key,
                    runs: Mutex::new(Vec::new()),
                });
                dispatcher.register(action.clone());
                actions.push(action);
            }

            let power = power_button(Duration::from_millis(1500), panel, &coordinator)
                .with_clock(clock.clone());
            let routes = Routes::new(
                Arc::new(dispatcher),
                scheduler.clone(),
                Duration::from_secs(20),
                power,
            );
            Self {
                routes,
                actions,
                scheduler,
                clock,
                coordinator,
            }
        }

        fn runs(&self, key: ActionKey) -> Vec<Trigger> {
            let action = self.actions.iter().find(|a| a.key == key).unwrap();
            action.runs.lock().unwrap().clone()
        }
    }

    fn camera() -> UsbDevice {
        UsbDevice {
            bus: 1,
            address: 4,
            vendor_id: 0x04a9,
            product_id: 0x3218,
        }
    }

    #[test]
    fn test_volume_and_devices_dispatch() {
        let fixture = Fixture::new();
        let volume = PathBuf::from("/var/run/usbmount/sdb1");

        let handle = fixture
            .routes
            .route(&Event::VolumeMounted(volume.clone()))
            .unwrap();
        assert_eq!(handle.join().unwrap(), Outcome::Completed);
        assert_eq!(fixture.runs(STORAGE_BACKUP), vec![Trigger::Volume(volume)]);

        let handle = fixture
            .routes
            .route(&Event::DeviceArrived {
                device: camera(),
                class: DeviceClass::Camera,
            })
            .unwrap();
        handle.join().unwrap();
        assert_eq!(fixture.runs(CAMERA_BACKUP), vec![Trigger::Device(camera())]);

        assert!(fixture.routes.route(&Event::DeviceLeft(camera())).is_none());
    }

    #[test]
    fn test_share_change_only_schedules() {
        let fixture = Fixture::new();
        let handle = fixture
            .routes
            .route(&Event::ShareChanged(PathBuf::from("/share/x.jpg")));
        assert!(handle.is_none());
        assert!(fixture.scheduler.pending().is_some());
        assert!(!fixture.scheduler.pop_due());

        fixture.clock.advance(Duration::from_secs(20));
        assert!(fixture.scheduler.pop_due());
    }

    #[test]
    fn test_pad_releases() {
        let fixture = Fixture::new();

        assert!(fixture
            .routes
            .route(&Event::Button(ButtonEvent::touch(pads::CATALOG)))
            .is_none());
        fixture
            .routes
            .route(&Event::Button(ButtonEvent::release(pads::CATALOG)))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(
            fixture.runs(CATALOG_SYNC),
            vec![Trigger::Button(pads::CATALOG)]
        );

        fixture
            .routes
            .route(&Event::Button(ButtonEvent::release(pads::GPS)))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(fixture.runs(GPS_BACKUP), vec![Trigger::Button(pads::GPS)]);

        // Storage and camera pads are indicators only.
        assert!(fixture
            .routes
            .route(&Event::Button(ButtonEvent::release(pads::STORAGE)))
            .is_none());
    }

    #[test]
    fn test_power_pad_long_press_requests_shutdown() {
        let fixture = Fixture::new();
        let power = |event: ButtonEvent| fixture.routes.route(&Event::Button(event));

        power(ButtonEvent::touch(pads::POWER));
        fixture.clock.advance(Duration::from_millis(500));
        power(ButtonEvent::release(pads::POWER));
        assert_eq!(fixture.coordinator.reason(), None);

        power(ButtonEvent::touch(pads::POWER));
        fixture.clock.advance(Duration::from_millis(1500));
        power(ButtonEvent::release(pads::POWER));
        assert_eq!(
            fixture.coordinator.reason(),
            Some(ShutdownReason::PowerButton)
        );
    }
}
