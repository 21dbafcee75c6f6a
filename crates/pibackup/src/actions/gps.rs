use super::GPS_BACKUP;
use crate::identity::secure_filename;
use crate::pads;
use crate::tools::BackupTools;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use pibackup_core::{Action, ActionKey, IndicatorId, Trigger};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const DEVICE_NAME: &str = "iGotU";

/// Downloads the GPS logger's track into a timestamped GPX file.
pub struct GpsBackup {
    tools: Arc<dyn BackupTools>,
    gps_dir: PathBuf,
}

impl GpsBackup {
    pub fn new(tools: Arc<dyn BackupTools>, gps_dir: PathBuf) -> Self {
        Self { tools, gps_dir }
    }
}

impl Action for GpsBackup {
    fn key(&self) -> ActionKey {
        GPS_BACKUP
    }

    fn indicator(&self) -> IndicatorId {
        pads::GPS.indicator()
    }

    fn run(&self, _trigger: &Trigger) -> Result<()> {
        info!("Downloading GPS tracks to {}", self.gps_dir.display());
        fs::create_dir_all(&self.gps_dir)
            .with_context(|| format!("Failed to create {}", self.gps_dir.display()))?;

        let output = track_file_name(&self.gps_dir, DEVICE_NAME, Local::now());
        self.tools
            .download_gps_track(&output)
            .context("GPS track download failed")?;
        info!("Downloaded GPS track to {}", output.display());
        Ok(())
    }
}

/// `<dir>/<device>_<YYYYmmdd_HHMMSS>.gpx`
pub fn track_file_name(dir: &Path, device: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "{}_{}.gpx",
        secure_filename(device),
        at.format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_track_file_name() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap();
        assert_eq!(
            track_file_name(Path::new("/share/gps"), "iGotU", at),
            PathBuf::from("/share/gps/iGotU_20240501_090307.gpx")
        );
    }
}
