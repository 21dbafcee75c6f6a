//! LED panels under the touch pads.

use crate::config::LedsConfig;
use crate::pads;
use pibackup_core::{IndicatorId, IndicatorPanel};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Writes `1`/`0` to `<root>/<led>/brightness` for each pad's LED.
#[derive(Debug)]
pub struct SysfsLedPanel {
    brightness: BTreeMap<IndicatorId, PathBuf>,
}

impl SysfsLedPanel {
    pub fn new(root: PathBuf, names: &BTreeMap<String, String>) -> Self {
        let mut brightness = BTreeMap::new();
        for (pad, led) in names {
            match pads::by_name(pad) {
                Some(pad) => {
                    brightness.insert(pad.indicator(), root.join(led).join("brightness"));
                }
                None => warn!(pad = %pad, "Ignoring LED for unknown pad"),
            }
        }
        Self { brightness }
    }
}

impl IndicatorPanel for SysfsLedPanel {
    fn set(&self, id: IndicatorId, on: bool) {
        let Some(path) = self.brightness.get(&id) else {
            trace!(indicator = %id, "No LED configured");
            return;
        };
        if let Err(e) = fs::write(path, if on { "1" } else { "0" }) {
            debug!(indicator = %id, path = %path.display(), "LED write failed: {}", e);
        }
    }

    fn all_off(&self) {
        for id in self.brightness.keys() {
            self.set(*id, false);
        }
    }
}

/// Stand-in when the device has no LEDs: transitions are only traced.
#[derive(Debug, Default)]
pub struct LogPanel;

impl IndicatorPanel for LogPanel {
    fn set(&self, id: IndicatorId, on: bool) {
        trace!(indicator = %id, on, "LED");
    }

    fn all_off(&self) {
        trace!("All LEDs off");
    }
}

pub fn from_config(leds: &LedsConfig) -> Arc<dyn IndicatorPanel> {
    match &leds.root {
        Some(root) => Arc::new(SysfsLedPanel::new(root.clone(), &leds.names)),
        None => Arc::new(LogPanel),
    }
}
