//! Configuration for the backup controller
//!
//! Every field has a default, so an empty (or missing) TOML file reproduces a
//! stock device: USB mounts under `/var/run/usbmount`, backups under `/share`.

use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory where the automounter creates one entry per mounted volume
    #[serde(default = "default_mount_watch_dir")]
    pub mount_watch_dir: PathBuf,

    /// Root of the shared backup tree
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,

    /// GPS track directory, `<backup_root>/gps` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_dir: Option<PathBuf>,

    /// Log directory, `<backup_root>/logs` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Photo catalog data directory
    #[serde(default = "default_catalog_data_dir")]
    pub catalog_data_dir: PathBuf,

    /// Photo catalog sync tool configuration file
    #[serde(default = "default_catalog_config")]
    pub catalog_config: PathBuf,

    #[serde(default = "default_true")]
    pub catalog_sync: bool,

    #[serde(default = "default_share_debounce_secs")]
    pub share_debounce_secs: u64,

    #[serde(default = "default_long_press_secs")]
    pub long_press_secs: f64,

    #[serde(default = "default_blink_interval_ms")]
    pub blink_interval_ms: u64,

    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_power_off_blink_secs")]
    pub power_off_blink_secs: u64,

    /// USB devices handled as GPS loggers; everything else is tried as a camera
    #[serde(default = "default_gps_devices")]
    pub gps_devices: Vec<UsbId>,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub buttons: ButtonsConfig,

    #[serde(default)]
    pub leds: LedsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// External command templates. Arguments may contain `{placeholder}`s that are
/// filled in when the command runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// `{source}`, `{dest}`
    #[serde(default = "default_mirror")]
    pub mirror: Vec<String>,

    #[serde(default = "default_flush")]
    pub flush: Vec<String>,

    /// `{path}`
    #[serde(default = "default_touch")]
    pub touch: Vec<String>,

    #[serde(default = "default_camera_detect")]
    pub camera_detect: Vec<String>,

    /// `{camera}`, `{port}`; runs inside the camera's destination directory
    #[serde(default = "default_camera_copy")]
    pub camera_copy: Vec<String>,

    /// `{output}`
    #[serde(default = "default_gps_download")]
    pub gps_download: Vec<String>,

    /// `{mode}`, `{source}`, `{data_dir}`, `{config}`
    #[serde(default = "default_catalog_sync")]
    pub catalog_sync: Vec<String>,

    #[serde(default = "default_power_off")]
    pub power_off: Vec<String>,
}

/// Touch pads read from a Linux input device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonsConfig {
    /// e.g. `/dev/input/event0`; pads are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,

    /// Pad name -> input key code
    #[serde(default = "default_key_map")]
    pub keys: BTreeMap<String, u16>,
}

/// One LED per pad under a sysfs LED class directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedsConfig {
    /// e.g. `/sys/class/leds`; LEDs are only logged when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Pad name -> LED directory name
    #[serde(default = "default_led_names")]
    pub names: BTreeMap<String, String>,
}

fn default_mount_watch_dir() -> PathBuf {
    PathBuf::from("/var/run/usbmount")
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("/share")
}

fn default_catalog_data_dir() -> PathBuf {
    PathBuf::from("/data/lychee")
}

fn default_catalog_config() -> PathBuf {
    PathBuf::from("lychee/lycheesync.conf")
}

fn default_true() -> bool {
    true
}

fn default_share_debounce_secs() -> u64 {
    20
}

fn default_long_press_secs() -> f64 {
    1.5
}

fn default_blink_interval_ms() -> u64 {
    500
}

fn default_join_timeout_secs() -> u64 {
    2
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_power_off_blink_secs() -> u64 {
    2
}

fn default_gps_devices() -> Vec<UsbId> {
    // i-gotU GT-600 / GT-120
    vec![UsbId {
        vendor_id: 0x0df7,
        product_id: 0x0900,
    }]
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn default_mirror() -> Vec<String> {
    argv(&[
        "rsync",
        "-a",
        "--chmod=Du=rwx,Dgo=rwx,Fu=rw,Fog=rw",
        "{source}/",
        "{dest}",
    ])
}

fn default_flush() -> Vec<String> {
    argv(&["sync"])
}

fn default_touch() -> Vec<String> {
    argv(&["touch", "{path}"])
}

fn default_camera_detect() -> Vec<String> {
    argv(&["gphoto2", "--auto-detect"])
}

fn default_camera_copy() -> Vec<String> {
    argv(&[
        "gphoto2",
        "--camera",
        "{camera}",
        "--port",
        "{port}",
        "--get-all-files",
        "--skip-existing",
        "--filename",
        "%F/%f.%C",
    ])
}

fn default_gps_download() -> Vec<String> {
    argv(&["gt2gpx", "{output}"])
}

fn default_catalog_sync() -> Vec<String> {
    argv(&[
        "lycheesync",
        "--mode",
        "{mode}",
        "{source}",
        "{data_dir}",
        "{config}",
    ])
}

fn default_power_off() -> Vec<String> {
    argv(&["sudo", "shutdown", "--poweroff", "now"])
}

fn default_key_map() -> BTreeMap<String, u16> {
    // KEY_BACK, KEY_A, KEY_B, KEY_C, KEY_D
    [("Back", 158), ("A", 30), ("B", 48), ("C", 46), ("D", 32)]
        .into_iter()
        .map(|(pad, code)| (pad.to_string(), code))
        .collect()
}

fn default_led_names() -> BTreeMap<String, String> {
    ["Back", "A", "B", "C", "D"]
        .into_iter()
        .map(|pad| (pad.to_string(), format!("touchphat:{}", pad.to_lowercase())))
        .collect()
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            mirror: default_mirror(),
            flush: default_flush(),
            touch: default_touch(),
            camera_detect: default_camera_detect(),
            camera_copy: default_camera_copy(),
            gps_download: default_gps_download(),
            catalog_sync: default_catalog_sync(),
            power_off: default_power_off(),
        }
    }
}

impl Default for ButtonsConfig {
    fn default() -> Self {
        Self {
            device: None,
            keys: default_key_map(),
        }
    }
}

impl Default for LedsConfig {
    fn default() -> Self {
        Self {
            root: None,
            names: default_led_names(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            mount_watch_dir: default_mount_watch_dir(),
            backup_root: default_backup_root(),
            gps_dir: None,
            log_dir: None,
            catalog_data_dir: default_catalog_data_dir(),
            catalog_config: default_catalog_config(),
            catalog_sync: default_true(),
            share_debounce_secs: default_share_debounce_secs(),
            long_press_secs: default_long_press_secs(),
            blink_interval_ms: default_blink_interval_ms(),
            join_timeout_secs: default_join_timeout_secs(),
            tick_ms: default_tick_ms(),
            power_off_blink_secs: default_power_off_blink_secs(),
            gps_devices: default_gps_devices(),
            commands: CommandsConfig::default(),
            buttons: ButtonsConfig::default(),
            leds: LedsConfig::default(),
        }
    }
}

impl BackupConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackupConfig =
            toml::from_str(&content).map_err(|e| BackupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| BackupError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.long_press_secs.is_finite() || self.long_press_secs < 0.0 {
            return Err(BackupError::Config(format!(
                "long_press_secs must be a non-negative number, got {}",
                self.long_press_secs
            )));
        }
        if self.tick_ms == 0 || self.blink_interval_ms == 0 {
            return Err(BackupError::Config(
                "tick_ms and blink_interval_ms must be positive".to_string(),
            ));
        }
        if self.commands.mirror.is_empty() || self.commands.power_off.is_empty() {
            return Err(BackupError::Config(
                "commands.mirror and commands.power_off must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gps_directory(&self) -> PathBuf {
        self.gps_dir
            .clone()
            .unwrap_or_else(|| self.backup_root.join("gps"))
    }

    pub fn log_directory(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.backup_root.join("logs"))
    }

    pub fn share_debounce(&self) -> Duration {
        Duration::from_secs(self.share_debounce_secs)
    }

    pub fn long_press(&self) -> Duration {
        Duration::try_from_secs_f64(self.long_press_secs)
            .unwrap_or_else(|_| Duration::from_millis(1500))
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn power_off_blink(&self) -> Duration {
        Duration::from_secs(self.power_off_blink_secs)
    }

    pub fn is_gps_device(&self, vendor_id: u16, product_id: u16) -> bool {
        self.gps_devices
            .iter()
            .any(|id| id.vendor_id == vendor_id && id.product_id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BackupConfig::default();
        assert_eq!(config.mount_watch_dir, PathBuf::from("/var/run/usbmount"));
        assert_eq!(config.gps_directory(), PathBuf::from("/share/gps"));
        assert_eq!(config.log_directory(), PathBuf::from("/share/logs"));
        assert_eq!(config.share_debounce(), Duration::from_secs(20));
        assert_eq!(config.long_press(), Duration::from_millis(1500));
        assert_eq!(config.join_timeout(), Duration::from_secs(2));
        assert!(config.is_gps_device(0x0df7, 0x0900));
        assert!(!config.is_gps_device(0x04a9, 0x3218));
        assert!(config.catalog_sync);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: BackupConfig = toml::from_str("").unwrap();
        assert_eq!(config, BackupConfig::default());
    }

    #[test]
    fn test_partial_file_overrides() {
        let config: BackupConfig = toml::from_str(
            r#"
            backup_root = "/mnt/backup"
            share_debounce_secs = 5
            gps_devices = [{ vendor_id = 0x1234, product_id = 0x5678 }]

            [leds]
            root = "/sys/class/leds"

            [buttons]
            device = "/dev/input/event3"
            "#,
        )
        .unwrap();

        assert_eq!(config.gps_directory(), PathBuf::from("/mnt/backup/gps"));
        assert_eq!(config.share_debounce_secs, 5);
        assert!(config.is_gps_device(0x1234, 0x5678));
        assert!(!config.is_gps_device(0x0df7, 0x0900));
        assert_eq!(config.leds.names.get("Back").map(String::as_str), Some("touchphat:back"));
        assert_eq!(config.buttons.keys.get("Back"), Some(&158));
        assert_eq!(config.commands, CommandsConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pibackup.toml");
        let mut config = BackupConfig::default();
        config.catalog_sync = false;
        config.log_dir = Some(PathBuf::from("/var/log/pibackup"));

        config.save(&path).unwrap();
        let loaded = BackupConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_negative_long_press_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "long_press_secs = -1.0").unwrap();
        assert!(matches!(BackupConfig::load(&path), Err(BackupError::Config(_))));
    }
}
