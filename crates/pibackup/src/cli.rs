//! Command line interface.

use crate::config::BackupConfig;
use anyhow::{Context, Result};
use clap::Parser;
use pibackup_logging::LogConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pibackup",
    version,
    about = "Unattended backup controller for USB drives, cameras and GPS loggers"
)]
pub struct Cli {
    /// Do not synchronize the photo catalog
    #[arg(short = 'n', long = "no-catalog-sync", visible_alias = "no-lychee-sync")]
    pub no_catalog_sync: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Log to stdout instead of the log directory
    #[arg(short, long)]
    pub stdout: bool,

    /// TOML configuration file
    #[arg(short, long, env = "PIBACKUP_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Load the configuration file (or the defaults) and apply the flags
    /// that override it.
    pub fn load_config(&self) -> Result<BackupConfig> {
        let mut config = match &self.config {
            Some(path) => BackupConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => BackupConfig::default(),
        };
        if self.no_catalog_sync {
            config.catalog_sync = false;
        }
        Ok(config)
    }

    pub fn log_config(&self, config: &BackupConfig) -> LogConfig {
        LogConfig {
            log_dir: config.log_directory(),
            debug: self.debug,
            console: self.stdout,
        }
    }
}
