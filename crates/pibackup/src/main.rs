//! PiBackup daemon entry point.

use anyhow::Result;
use clap::Parser;
use pibackup::cli::Cli;
use pibackup::Daemon;
use pibackup_core::ShutdownCoordinator;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match pibackup_logging::init_logging(&cli.log_config(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        catalog_sync = config.catalog_sync,
        "Starting pibackup"
    );

    let daemon = Daemon::new(config);
    if let Err(e) = install_signal_handler(daemon.coordinator()) {
        error!("Failed to install signal handler: {:#}", e);
        return ExitCode::FAILURE;
    }

    let outcome = daemon.run();
    info!(?outcome, "pibackup stopped");
    ExitCode::from(outcome.exit_code())
}

#[cfg(unix)]
fn install_signal_handler(coordinator: Arc<ShutdownCoordinator>) -> Result<()> {
    use pibackup_core::ShutdownReason;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, initiating shutdown...", sig);
                coordinator.shutdown(ShutdownReason::Signal);
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(_coordinator: Arc<ShutdownCoordinator>) -> Result<()> {
    Ok(())
}
