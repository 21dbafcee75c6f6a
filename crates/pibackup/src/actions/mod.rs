//! The four backup actions and their keys.
//!
//! Storage and camera backups schedule an immediate catalog sync when they
//! copied something. The share watcher schedules one too, later; whichever
//! request comes last wins.

mod camera;
mod catalog;
mod gps;
mod storage;

pub use camera::CameraBackup;
pub use catalog::{prune_broken_symlinks, CatalogSync};
pub use gps::{track_file_name, GpsBackup};
pub use storage::StorageBackup;

use crate::config::BackupConfig;
use crate::tools::BackupTools;
use pibackup_core::{Action, ActionKey, DebounceScheduler};
use std::sync::Arc;

pub const STORAGE_BACKUP: ActionKey = ActionKey::new("storage-backup");
pub const CAMERA_BACKUP: ActionKey = ActionKey::new("camera-backup");
pub const GPS_BACKUP: ActionKey = ActionKey::new("gps-backup");
pub const CATALOG_SYNC: ActionKey = ActionKey::new("catalog-sync");

/// Build every action from the configuration.
pub fn all(
    config: &BackupConfig,
    tools: Arc<dyn BackupTools>,
    scheduler: Arc<DebounceScheduler>,
) -> Vec<Arc<dyn Action>> {
    let mut actions: Vec<Arc<dyn Action>> = Vec::with_capacity(4);
    actions.push(Arc::new(StorageBackup::new(
        Arc::clone(&tools),
        Arc::clone(&scheduler),
        config.backup_root.clone(),
    )));
    actions.push(Arc::new(CameraBackup::new(
        Arc::clone(&tools),
        scheduler,
        config.backup_root.clone(),
    )));
    actions.push(Arc::new(GpsBackup::new(
        Arc::clone(&tools),
        config.gps_directory(),
    )));
    actions.push(Arc::new(CatalogSync::new(
        tools,
        config.catalog_sync,
        config.catalog_data_dir.clone(),
    )));
    actions
}
