use super::CATALOG_SYNC;
use crate::pads;
use crate::tools::{BackupTools, CatalogMode};
use anyhow::Result;
use pibackup_core::{Action, ActionKey, IndicatorId, Trigger};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Imports the backup tree into the photo catalog.
///
/// A run started from the catalog pad is a complete sync: broken symlinks in
/// the catalog data are pruned and the catalog is rebuilt. Scheduled runs only
/// import new photos.
pub struct CatalogSync {
    tools: Arc<dyn BackupTools>,
    enabled: bool,
    data_dir: PathBuf,
}

impl CatalogSync {
    pub fn new(tools: Arc<dyn BackupTools>, enabled: bool, data_dir: PathBuf) -> Self {
        Self {
            tools,
            enabled,
            data_dir,
        }
    }
}

impl Action for CatalogSync {
    fn key(&self) -> ActionKey {
        CATALOG_SYNC
    }

    fn indicator(&self) -> IndicatorId {
        pads::CATALOG.indicator()
    }

    fn run(&self, trigger: &Trigger) -> Result<()> {
        if !self.enabled {
            info!("Catalog synchronization is disabled");
            return Ok(());
        }
        info!("Starting catalog synchronization");

        let mode = if matches!(trigger, Trigger::Button(_)) {
            info!("Removing broken symlinks from the catalog");
            let removed = prune_broken_symlinks(&self.data_dir);
            debug!(removed, "Broken symlinks removed");
            CatalogMode::Replace
        } else {
            CatalogMode::Normal
        };

        // A failed import still leaves the disks flushed.
        if let Err(e) = self.tools.sync_catalog(mode) {
            error!("Unable to perform catalog synchronization ({} mode): {}", mode, e);
        }

        self.tools.flush_disks()?;
        info!("Finished catalog synchronization");
        Ok(())
    }
}

/// Delete every symlink under `dir` whose target no longer exists. Returns
/// how many were removed.
pub fn prune_broken_symlinks(dir: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping catalog entry: {}", e);
                continue;
            }
        };
        if !entry.path_is_symlink() || fs::metadata(entry.path()).is_ok() {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), "Failed to remove broken symlink: {}", e),
        }
    }
    removed
}
