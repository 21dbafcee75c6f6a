//! Event-source adapters. Each owns one listening thread that publishes typed
//! events on the bus and never runs an action itself.

mod buttons;
mod share;
mod storage;
mod usb;

pub use buttons::{decode_input_event, ButtonSource, INPUT_EVENT_SIZE};
pub use share::{ShareFilter, ShareWatcher};
pub use storage::{mounted_volumes, MountWatcher};
pub use usb::{classify, UsbHotplugSource};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use pibackup_core::{Event, EventBus, SourceError, SourceThread};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receive timeout of the watcher loops, bounding how long `stop` takes.
const WATCH_POLL: Duration = Duration::from_millis(100);

/// Watch `path` and publish whatever `translate` makes of each filesystem
/// event. The watcher is created on the calling thread so setup errors reach
/// `start`, then moves into the loop thread and dies with it.
fn spawn_watcher<F>(
    name: &str,
    path: &Path,
    mode: RecursiveMode,
    bus: Arc<EventBus>,
    translate: F,
) -> Result<SourceThread, SourceError>
where
    F: Fn(&notify::Event) -> Vec<Event> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| SourceError::watch(name, e))?;
    watcher
        .watch(path, mode)
        .map_err(|e| SourceError::watch(name, format!("{}: {}", path.display(), e)))?;
    info!(source = name, path = %path.display(), "Watching for changes");

    let source_name = name.to_string();
    SourceThread::spawn(name, move |stop| {
        let _watcher = watcher;
        while !stop.is_stopped() {
            match rx.recv_timeout(WATCH_POLL) {
                Ok(Ok(event)) => {
                    for translated in translate(&event) {
                        bus.publish(translated);
                    }
                }
                Ok(Err(e)) => warn!(source = %source_name, "Watch error: {}", e),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(source = %source_name, "Watcher channel closed");
                    break;
                }
            }
        }
        debug!(source = %source_name, "Watch loop stopped");
    })
}
