use super::STORAGE_BACKUP;
use crate::identity::resolve_identity;
use crate::pads;
use crate::tools::BackupTools;
use anyhow::{bail, Context, Result};
use pibackup_core::{Action, ActionKey, DebounceScheduler, IndicatorId, Trigger};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Mirrors a newly mounted volume into `<backup_root>/<identity>/`.
pub struct StorageBackup {
    tools: Arc<dyn BackupTools>,
    scheduler: Arc<DebounceScheduler>,
    backup_root: PathBuf,
}

impl StorageBackup {
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

impl Action for StorageBackup {
    fn key(&self) -> ActionKey {
        STORAGE_BACKUP
    }

    fn indicator(&self) -> IndicatorId {
        pads::STORAGE.indicator()
    }

    fn run(&self, trigger: &Trigger) -> Result<()> {
        let Trigger::Volume(source) = trigger else {
            bail!("storage backup needs a mounted volume, got {:?}", trigger);
        };

        let identity = resolve_identity(source);
        let dest = self.backup_root.join(&identity);
        fs::create_dir_all(&dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        info!("Starting backup for {} to {}", source.display(), dest.display());
        self.tools
            .mirror_volume(source, &dest)
            .with_context(|| format!("Failed to mirror {}", source.display()))?;
        self.tools.flush_disks()?;
        self.tools.touch(&dest)?;
        info!("Finished backup for {}", source.display());

        self.scheduler.schedule(Duration::ZERO);
        Ok(())
    }
}
