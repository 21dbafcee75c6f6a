use super::CAMERA_BACKUP;
use crate::pads;
use crate::tools::BackupTools;
use anyhow::{Context, Result};
use pibackup_core::{Action, ActionKey, DebounceScheduler, IndicatorId, Trigger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Pulls new files off every connected camera.
pub struct CameraBackup {
    tools: Arc<dyn BackupTools>,
    scheduler: Arc<DebounceScheduler>,
    backup_root: PathBuf,
}

impl CameraBackup {
    pub fn new(
        tools: Arc<dyn BackupTools>,
        scheduler: Arc<DebounceScheduler>,
        backup_root: PathBuf,
    ) -> Self {
        Self {
            tools,
            scheduler,
            backup_root,
        }
    }
}

impl Action for CameraBackup {
    fn key(&self) -> ActionKey {
        CAMERA_BACKUP
    }

    fn indicator(&self) -> IndicatorId {
        pads::CAMERA.indicator()
    }

    fn run(&self, trigger: &Trigger) -> Result<()> {
        if let Trigger::Device(device) = trigger {
            info!("Starting camera backup for {}", device);
        }

        let copies = self
            .tools
            .copy_cameras(&self.backup_root)
            .context("Camera copy failed")?;
        if copies == 0 {
            info!("No new files on the cameras");
            return Ok(());
        }

        self.tools.flush_disks()?;
        self.scheduler.schedule(Duration::ZERO);
        Ok(())
    }
}
