//! Logging setup for the PiBackup daemon.
//!
//! Either a console layer on stdout, or a daily-rolling file under the backup
//! tree's log directory written through a non-blocking worker.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "pibackup";
const LOG_FILE_SUFFIX: &str = "log";
/// Daily files kept before the oldest is deleted.
pub const MAX_LOG_FILES: usize = 60;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub debug: bool,
    /// Log to stdout instead of the rolling file.
    pub console: bool,
}

/// Keeps the non-blocking writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Install the global subscriber. `RUST_LOG` overrides the level chosen by
/// `debug`.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(config.debug)));

    if config.console {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(timer())
                    .with_writer(std::io::stdout)
                    .with_filter(filter),
            )
            .try_init()
            .context("Failed to install console logger")?;
        return Ok(LogGuard { _worker: None });
    }

    let appender = file_appender(&config.log_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(timer())
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter),
        )
        .try_init()
        .context("Failed to install file logger")?;

    Ok(LogGuard {
        _worker: Some(guard),
    })
}

/// Daily-rotating appender in `log_dir`, created on demand.
pub fn file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .with_context(|| format!("Failed to open log file in {}", log_dir.display()))
}

fn default_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn timer() -> ChronoLocal {
    ChronoLocal::new(TIMESTAMP_FORMAT.to_string())
}
