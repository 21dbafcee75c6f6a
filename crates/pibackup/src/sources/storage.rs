//! Storage arrival: the automounter creates one directory (or symlink) per
//! mounted volume in its event directory.

use super::spawn_watcher;
use notify::{EventKind, RecursiveMode};
use pibackup_core::source::{join_thread, stop_thread};
use pibackup_core::{Event, EventBus, EventSource, SourceError, SourceThread};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "mount-watcher";

pub struct MountWatcher {
    dir: PathBuf,
    bus: Arc<EventBus>,
    thread: Option<SourceThread>,
}

impl MountWatcher {
    pub fn new(dir: PathBuf, bus: Arc<EventBus>) -> Self {
        Self {
            dir,
            bus,
            thread: None,
        }
    }
}

impl EventSource for MountWatcher {
    fn name(&self) -> &str {
        NAME
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if self.thread.is_some() {
            return Ok(());
        }
        self.thread = Some(spawn_watcher(
            NAME,
            &self.dir,
            RecursiveMode::NonRecursive,
            Arc::clone(&self.bus),
            mounted_volumes,
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

/// Volumes announced by a filesystem event: created entries that are
/// directories or symlinks. Plain files are ignored.
pub fn mounted_volumes(event: &notify::Event) -> Vec<Event> {
    if !matches!(event.kind, EventKind::Create(_)) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|path| path.is_dir() || path.is_symlink())
        .map(|path| Event::VolumeMounted(path.clone()))
        .collect()
}
