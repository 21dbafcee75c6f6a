//! The five touch pads and the LEDs under them.

use pibackup_core::ButtonId;

/// Long press powers the device off. Its LED stays on while running.
pub const POWER: ButtonId = ButtonId::new("Back");
/// Busy indicator of the storage backup.
pub const STORAGE: ButtonId = ButtonId::new("A");
/// Busy indicator of the camera backup.
pub const CAMERA: ButtonId = ButtonId::new("B");
/// Release starts a GPS track download.
pub const GPS: ButtonId = ButtonId::new("C");
/// Release starts a complete catalog sync.
pub const CATALOG: ButtonId = ButtonId::new("D");

pub const ALL: [ButtonId; 5] = [POWER, STORAGE, CAMERA, GPS, CATALOG];

pub fn by_name(name: &str) -> Option<ButtonId> {
    ALL.into_iter().find(|pad| pad.as_str() == name)
}
