//! PiBackup - unattended backup controller
//!
//! Watches for USB drives, cameras, GPS loggers and touch-pad presses, and
//! runs the matching backup into the shared backup tree. The orchestration
//! primitives live in `pibackup_core`; this crate supplies the configuration,
//! the external tools, the event sources and the routing between them.

pub mod actions;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod identity;
pub mod pads;
pub mod panel;
pub mod routes;
pub mod sources;
pub mod tools;

pub use config::BackupConfig;
pub use daemon::{Daemon, RunOutcome};
pub use error::{BackupError, Result};
pub use tools::{BackupTools, SystemTools};
