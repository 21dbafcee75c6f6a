//! Shared-directory changes, which feed the debounced catalog sync.

use super::spawn_watcher;
use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode};
use pibackup_core::source::{join_thread, stop_thread};
use pibackup_core::{Event, EventBus, EventSource, SourceError, SourceThread};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "share-watcher";

/// Which filesystem events count as a change to the backup tree.
#[derive(Debug, Clone)]
pub struct ShareFilter {
    exclude: PathBuf,
}

impl ShareFilter {
    /// Changes under `exclude` (the log directory) are ignored.
    pub fn new(exclude: PathBuf) -> Self {
        Self { exclude }
    }

    pub fn changes(&self, event: &notify::Event) -> Vec<Event> {
        let qualifies = match &event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => true,
            EventKind::Modify(ModifyKind::Metadata(_)) => false,
            EventKind::Modify(_) => true,
            _ => false,
        };
        if !qualifies {
            return Vec::new();
        }
        event
            .paths
            .iter()
            .filter(|path| !path.starts_with(&self.exclude))
            .map(|path| Event::ShareChanged(path.clone()))
            .collect()
    }
}

pub struct ShareWatcher {
    root: PathBuf,
    filter: ShareFilter,
    bus: Arc<EventBus>,
    thread: Option<SourceThread>,
}

impl ShareWatcher {
    pub fn new(root: PathBuf, log_dir: PathBuf, bus: Arc<EventBus>) -> Self {
        Self {
            root,
            filter: ShareFilter::new(log_dir),
            bus,
            thread: None,
        }
    }
}

impl EventSource for ShareWatcher {
    fn name(&self) -> &str {
        NAME
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if self.thread.is_some() {
            return Ok(());
        }
        let filter = self.filter.clone();
        self.thread = Some(spawn_watcher(
            NAME,
            &self.root,
            RecursiveMode::Recursive,
            Arc::clone(&self.bus),
            move |event| filter.changes(event),
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
