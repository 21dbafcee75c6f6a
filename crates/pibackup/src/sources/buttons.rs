//! Touch pads exposed as a Linux input device.
//!
//! The device is read in non-blocking mode as a stream of `input_event`
//! records: a `timeval`, then `type: u16`, `code: u16`, `value: i32`.

use crate::config::ButtonsConfig;
use crate::pads;
use pibackup_core::source::{join_thread, stop_thread};
use pibackup_core::{ButtonEvent, ButtonId, EventBus, EventSource, SourceError, SourceThread};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const NAME: &str = "touch-pads";

#[cfg(unix)]
const TIMEVAL_SIZE: usize = std::mem::size_of::<libc::timeval>();
#[cfg(not(unix))]
const TIMEVAL_SIZE: usize = 2 * std::mem::size_of::<usize>();

/// Size of one `struct input_event`.
pub const INPUT_EVENT_SIZE: usize = TIMEVAL_SIZE + 8;

const EV_KEY: u16 = 0x01;
const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;

pub struct ButtonSource {
    device: Option<PathBuf>,
    keys: HashMap<u16, ButtonId>,
    bus: Arc<EventBus>,
    thread: Option<SourceThread>,
}

impl ButtonSource {
    pub fn new(config: &ButtonsConfig, bus: Arc<EventBus>) -> Self {
        let mut keys = HashMap::new();
        for (pad, code) in &config.keys {
            match pads::by_name(pad) {
                Some(button) => {
                    keys.insert(*code, button);
                }
                None => warn!(pad = %pad, "Ignoring key mapping for unknown pad"),
            }
        }
        Self {
            device: config.device.clone(),
            keys,
            bus,
            thread: None,
        }
    }
}

impl EventSource for ButtonSource {
    fn name(&self) -> &str {
        NAME
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if self.thread.is_some() {
            return Ok(());
        }
        let Some(device) = &self.device else {
            return Err(SourceError::unavailable(NAME, "no input device configured"));
        };
        self.thread = Some(reader::spawn(
            device,
            self.keys.clone(),
            Arc::clone(&self.bus),
        )?);
        Ok(())
    }

    fn stop(&self) {
        stop_thread(&self.thread);
    }

    fn join(&mut self, timeout: Duration) -> Result<(), SourceError> {
        join_thread(&mut self.thread, timeout)
    }
}

/// Decode one `input_event` record into a pad transition. Anything other
/// than a press or release of a mapped key yields `None`, including
/// autorepeat.
pub fn decode_input_event(record: &[u8], keys: &HashMap<u16, ButtonId>) -> Option<ButtonEvent> {
    if record.len() < INPUT_EVENT_SIZE {
        return None;
    }
    let body = &record[TIMEVAL_SIZE..INPUT_EVENT_SIZE];
    let kind = u16::from_ne_bytes([body[0], body[1]]);
    let code = u16::from_ne_bytes([body[2], body[3]]);
    let value = i32::from_ne_bytes([body[4], body[5], body[6], body[7]]);

    if kind != EV_KEY {
        return None;
    }
    let button = *keys.get(&code)?;
    match value {
        KEY_PRESS => Some(ButtonEvent::touch(button)),
        KEY_RELEASE => Some(ButtonEvent::release(button)),
        _ => None,
    }
}

#[cfg(unix)]
mod reader {
    use super::{decode_input_event, INPUT_EVENT_SIZE, NAME};
    use pibackup_core::{ButtonId, Event, EventBus, SourceError, SourceThread};
    use std::collections::HashMap;
    use std::fs::OpenOptions;
    use std::io::{ErrorKind, Read};
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, error, info};

    const READ_POLL: Duration = Duration::from_millis(20);
    const BATCH: usize = 16;

    pub(super) fn spawn(
        device: &Path,
        keys: HashMap<u16, ButtonId>,
        bus: Arc<EventBus>,
    ) -> Result<SourceThread, SourceError> {
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(device)
            .map_err(|e| SourceError::unavailable(NAME, format!("{}: {}", device.display(), e)))?;
        info!(device = %device.display(), "Reading touch pads");

        SourceThread::spawn(NAME, move |stop| {
            let mut buf = vec![0u8; INPUT_EVENT_SIZE * BATCH];
            while !stop.is_stopped() {
                match file.read(&mut buf) {
                    Ok(0) => thread::sleep(READ_POLL),
                    Ok(n) => {
                        for record in buf[..n].chunks_exact(INPUT_EVENT_SIZE) {
                            if let Some(event) = decode_input_event(record, &keys) {
                                debug!(button = %event.button, phase = ?event.phase, "Touch pad");
                                bus.publish(Event::Button(event));
                            }
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(READ_POLL),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        error!("Touch pad device read failed: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(not(unix))]
mod reader {
    use super::NAME;
    use pibackup_core::{ButtonId, EventBus, SourceError, SourceThread};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;

    pub(super) fn spawn(
        _device: &Path,
        _keys: HashMap<u16, ButtonId>,
        _bus: Arc<EventBus>,
    ) -> Result<SourceThread, SourceError> {
        Err(SourceError::unavailable(NAME, "input devices are only supported on Unix"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pibackup_core::ButtonPhase;

    fn record(kind: u16, code: u16, value: i32) -> Vec<u8> {
        let mut bytes = vec![0u8; TIMEVAL_SIZE];
        bytes.extend_from_slice(&kind.to_ne_bytes());
        bytes.extend_from_slice(&code.to_ne_bytes());
        bytes.extend_from_slice(&value.to_ne_bytes());
        bytes
    }

    fn keys() -> HashMap<u16, ButtonId> {
        HashMap::from([(158, pads::POWER), (32, pads::CATALOG)])
    }

    #[test]
    fn test_decode_press_and_release() {
        let keys = keys();
        let touch = decode_input_event(&record(EV_KEY, 158, 1), &keys).unwrap();
        assert_eq!(touch, ButtonEvent::touch(pads::POWER));

        let release = decode_input_event(&record(EV_KEY, 32, 0), &keys).unwrap();
        assert_eq!(release.button, pads::CATALOG);
        assert_eq!(release.phase, ButtonPhase::Release);
    }

    #[test]
    fn test_decode_ignores_noise() {
        let keys = keys();
        // Autorepeat, unmapped key, sync event, short record.
        assert_eq!(decode_input_event(&record(EV_KEY, 158, 2), &keys), None);
        assert_eq!(decode_input_event(&record(EV_KEY, 30, 1), &keys), None);
        assert_eq!(decode_input_event(&record(0x00, 0, 0), &keys), None);
        assert_eq!(decode_input_event(&[0u8; 4], &keys), None);
    }

    #[test]
    fn test_unconfigured_device_is_unavailable() {
        let mut config = ButtonsConfig::default();
        config.device = None;
        config.keys.insert("Nope".to_string(), 99);
        let mut source = ButtonSource::new(&config, Arc::new(EventBus::new()));
        assert_eq!(source.keys.len(), 5);
        assert!(matches!(source.start(), Err(SourceError::Unavailable { .. })));
        source.stop();
    }

    #[cfg(unix)]
    #[test]
    fn test_reads_records_from_device_file() {
        use pibackup_core::Event;
        use std::sync::Mutex;

        let tmp = tempfile::tempdir().unwrap();
        let device = tmp.path().join("event0");
        let mut bytes = record(EV_KEY, 32, 1);
        bytes.extend(record(EV_KEY, 32, 2));
        bytes.extend(record(EV_KEY, 32, 0));
        std::fs::write(&device, bytes).unwrap();

        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event| {
                if let Event::Button(button) = event {
                    seen.lock().unwrap().push(*button);
                }
            });
        }

        let mut config = ButtonsConfig::default();
        config.device = Some(device);
        let mut source = ButtonSource::new(&config, bus);
        source.start().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().len() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        source.stop();
        source.join(Duration::from_secs(2)).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ButtonEvent::touch(pads::CATALOG),
                ButtonEvent::release(pads::CATALOG)
            ]
        );
    }
}
