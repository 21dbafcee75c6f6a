//! USB hotplug. Arrivals are classified and published right away; the
//! event-loop thread never waits on a backup.

use crate::config::UsbId;
use pibackup_core::source::{join_thread, stop_thread};
use pibackup_core::{DeviceClass, EventBus, EventSource, SourceError, SourceThread, UsbDevice};
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "usb-hotplug";

/// GPS when the device is one of the known GPS loggers, camera otherwise.
pub fn classify(gps_devices: &[UsbId], device: &UsbDevice) -> DeviceClass {
    let is_gps = gps_devices
        .iter()
        .any(|id| id.vendor_id == device.vendor_id && id.product_id == device.product_id);
    if is_gps {
        DeviceClass::Gps
    } else {
        DeviceClass::Camera
    }
}

pub struct UsbHotplugSource {
    gps_devices: Vec<UsbId>,
    bus: Arc<EventBus>,
    thread: Option<SourceThread>,
}

impl UsbHotplugSource {
    pub fn new(gps_devices: Vec<UsbId>, bus: Arc<EventBus>) -> Self {
        Self {
            gps_devices,
            bus,
            thread: None,
        }
    }
}

impl EventSource for UsbHotplugSource {
    fn name(&self) -> &str {
        NAME
    }

    #[cfg(feature = "usb")]
    fn start(&mut self) -> Result<(), SourceError> {
        if self.thread.is_some() {
            return Ok(());
        }
        self.thread = Some(hotplug::spawn(
            self.gps_devices.clone(),
            Arc::clone(&self.bus),
        )?);
        Ok(())
    }

    #[cfg(not(feature = "usb"))]
    fn start(&mut self) -> Result<(), SourceError> {
        let _ = (&self.gps_devices, &self.bus);
        Err(SourceError::unavailable(
            NAME,
            "built without USB support (enable the `usb` feature)",
        ))
    }

    fn stop(&self) {
        stop_thread(&self.thread);
    }

    fn join(&mut self, timeout: Duration) -> Result<(), SourceError> {
        join_thread(&mut self.thread, timeout)
    }
}

#[cfg(feature = "usb")]
mod hotplug {
    use super::{classify, NAME};
    use crate::config::UsbId;
    use pibackup_core::{Event, EventBus, SourceError, SourceThread, UsbDevice};
    use rusb::{Context, Device, Hotplug, HotplugBuilder, UsbContext};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tracing::{info, warn};

    /// Upper bound of one `handle_events` call.
    const EVENT_POLL: Duration = Duration::from_millis(200);

    struct Forwarder {
        gps_devices: Vec<UsbId>,
        bus: Arc<EventBus>,
    }

    impl Forwarder {
        fn describe(device: &Device<Context>) -> Option<UsbDevice> {
            match device.device_descriptor() {
                Ok(descriptor) => Some(UsbDevice {
                    bus: device.bus_number(),
                    address: device.address(),
                    vendor_id: descriptor.vendor_id(),
                    product_id: descriptor.product_id(),
                }),
                Err(e) => {
                    warn!("Unreadable USB device descriptor: {}", e);
                    None
                }
            }
        }
    }

    impl Hotplug<Context> for Forwarder {
        fn device_arrived(&mut self, device: Device<Context>) {
            let Some(device) = Self::describe(&device) else {
                return;
            };
            info!("Device arrived: {}", device);
            let class = classify(&self.gps_devices, &device);
            self.bus.publish(Event::DeviceArrived { device, class });
        }

        fn device_left(&mut self, device: Device<Context>) {
            if let Some(device) = Self::describe(&device) {
                self.bus.publish(Event::DeviceLeft(device));
            }
        }
    }

    pub(super) fn spawn(
        gps_devices: Vec<UsbId>,
        bus: Arc<EventBus>,
    ) -> Result<SourceThread, SourceError> {
        if !rusb::has_hotplug() {
            return Err(SourceError::unavailable(
                NAME,
                "Hotplug support is missing. Please update your libusb version.",
            ));
        }
        let context = Context::new().map_err(|e| SourceError::unavailable(NAME, e.to_string()))?;

        info!("Registering hotplug callback...");
        let callback: Box<dyn Hotplug<Context>> = Box::new(Forwarder { gps_devices, bus });
        let registration = HotplugBuilder::new()
            .enumerate(false)
            .register(&context, callback)
            .map_err(|e| SourceError::watch(NAME, e))?;
        info!("Callback registered, monitoring USB events");

        SourceThread::spawn(NAME, move |stop| {
            let _registration = registration;
            while !stop.is_stopped() {
                if let Err(e) = context.handle_events(Some(EVENT_POLL)) {
                    warn!("USB event handling failed: {}", e);
                    thread::sleep(EVENT_POLL);
                }
            }
            info!("USB monitoring stopped");
        })
    }
}
