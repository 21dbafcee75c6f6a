//! The controller main loop.
//!
//! Startup wires the routing table onto the bus and launches every event
//! source. The loop then sleeps on the exit signal one tick at a time, running
//! the catalog sync whenever the debounce scheduler comes due. Shutdown is
//! owned by the [`ShutdownCoordinator`]; the loop waits for it, gives running
//! actions up to the join timeout to finish and, after a power-pad shutdown,
//! powers the device off.

use crate::actions::{self, CATALOG_SYNC};
use crate::config::BackupConfig;
use crate::pads;
use crate::panel;
use crate::routes::{self, Routes};
use crate::sources::{ButtonSource, MountWatcher, ShareWatcher, UsbHotplugSource};
use crate::tools::{BackupTools, SystemTools};
use pibackup_core::{
    panic_message, BusyIndicator, DebounceScheduler, Dispatcher, EventBus, EventSource,
    IndicatorPanel, Outcome, ShutdownCoordinator, ShutdownReason, Trigger,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extra wait on top of the per-source join bounds.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);
const MAX_SHUTDOWN_WAIT: Duration = Duration::from_secs(3600);

/// How a [`Daemon::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped by a signal.
    Stopped,
    /// Stopped by the power pad and the power-off command succeeded.
    PoweredOff,
    PowerOffFailed,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Stopped | Self::PoweredOff => 0,
            Self::PowerOffFailed => 1,
        }
    }
}

pub struct Daemon {
    config: BackupConfig,
    tools: Arc<dyn BackupTools>,
    panel: Arc<dyn IndicatorPanel>,
    bus: Arc<EventBus>,
    scheduler: Arc<DebounceScheduler>,
    dispatcher: Arc<Dispatcher>,
    coordinator: Arc<ShutdownCoordinator>,
    sources: Vec<Box<dyn EventSource>>,
}

impl Daemon {
    /// A daemon with the system tools, the configured LED panel and every
    /// event source.
    pub fn new(config: BackupConfig) -> Self {
        let tools: Arc<dyn BackupTools> = Arc::new(SystemTools::new(&config));
        let panel = panel::from_config(&config.leds);
        let mut daemon = Self::with_parts(config, tools, panel);

        let bus = Arc::clone(&daemon.bus);
        let config = &daemon.config;
        let sources: Vec<Box<dyn EventSource>> = vec![
            Box::new(MountWatcher::new(
                config.mount_watch_dir.clone(),
                Arc::clone(&bus),
            )),
            Box::new(ShareWatcher::new(
                config.backup_root.clone(),
                config.log_directory(),
                Arc::clone(&bus),
            )),
            Box::new(UsbHotplugSource::new(
                config.gps_devices.clone(),
                Arc::clone(&bus),
            )),
            Box::new(ButtonSource::new(&config.buttons, bus)),
        ];
        daemon.sources = sources;
        daemon
    }

    /// A fully routed daemon without event sources.
    pub fn with_parts(
        config: BackupConfig,
        tools: Arc<dyn BackupTools>,
        panel: Arc<dyn IndicatorPanel>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let scheduler = Arc::new(DebounceScheduler::new());
        let coordinator = Arc::new(ShutdownCoordinator::new(
            Arc::clone(&panel),
            config.join_timeout(),
        ));

        let mut dispatcher = Dispatcher::new(BusyIndicator::new(
            Arc::clone(&panel),
            config.blink_interval(),
        ));
        for action in actions::all(&config, Arc::clone(&tools), Arc::clone(&scheduler)) {
            dispatcher.register(action);
        }
        let dispatcher = Arc::new(dispatcher);

        let power = routes::power_button(config.long_press(), Arc::clone(&panel), &coordinator);
        Arc::new(Routes::new(
            Arc::clone(&dispatcher),
            Arc::clone(&scheduler),
            config.share_debounce(),
            power,
        ))
        .install(&bus);

        Self {
            config,
            tools,
            panel,
            bus,
            scheduler,
            dispatcher,
            coordinator,
            sources: Vec::new(),
        }
    }

    pub fn add_source(&mut self, source: Box<dyn EventSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn scheduler(&self) -> Arc<DebounceScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Run until shutdown. Blocks the calling thread.
    pub fn run(mut self) -> RunOutcome {
        let source_count = self.sources.len();
        for source in self.sources.drain(..) {
            self.coordinator.launch(source);
        }
        self.panel.set(pads::POWER.indicator(), true);
        info!(
            backup_root = %self.config.backup_root.display(),
            "Backup controller running"
        );

        let exit = self.coordinator.exit_signal();
        let tick = self.config.tick();
        while !exit.wait_timeout(tick) {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
                error!("Main loop tick panicked: {}", panic_message(payload.as_ref()));
            }
        }

        self.coordinator.shutdown(ShutdownReason::Signal);
        if !self.coordinator.wait_stopped(self.shutdown_bound(source_count)) {
            warn!("Shutdown did not finish in time");
        }
        self.finish_actions();

        match self.coordinator.reason() {
            Some(ShutdownReason::PowerButton) => self.power_off(),
            _ => RunOutcome::Stopped,
        }
    }

    /// Run the catalog sync if the scheduler came due.
    pub fn tick(&self) {
        if !self.scheduler.pop_due() {
            return;
        }
        match self
            .dispatcher
            .run_blocking(CATALOG_SYNC, &Trigger::Scheduled)
        {
            Ok(Outcome::Skipped) => debug!("Scheduled catalog sync skipped, one is running"),
            Ok(outcome) => debug!(?outcome, "Scheduled catalog sync done"),
            Err(e) => error!("Scheduled catalog sync: {}", e),
        }
    }

    /// Give dispatched actions up to the join timeout, then switch off any
    /// indicator they left behind.
    fn finish_actions(&self) {
        if self.dispatcher.in_flight() == 0 {
            return;
        }
        info!("Waiting for running actions to finish");
        let remaining = self.dispatcher.join_in_flight(self.config.join_timeout());
        if remaining > 0 {
            warn!(remaining, "Actions still running at exit");
        }
        self.panel.all_off();
    }

    fn shutdown_bound(&self, source_count: usize) -> Duration {
        let joins = u32::try_from(source_count + 1).unwrap_or(u32::MAX);
        self.config
            .join_timeout()
            .saturating_mul(joins)
            .saturating_add(SHUTDOWN_SLACK)
            .min(MAX_SHUTDOWN_WAIT)
    }

    fn power_off(&self) -> RunOutcome {
        info!("Powering off");
        let blink = self.config.power_off_blink();
        if let Err(e) = self
            .dispatcher
            .indicator()
            .with_indicator(pads::POWER.indicator(), || thread::sleep(blink))
        {
            warn!("Could not blink the power LED: {}", e);
        }

        match self.tools.power_off() {
            Ok(()) => RunOutcome::PoweredOff,
            Err(e) => {
                error!("Power off failed: {}", e);
                RunOutcome::PowerOffFailed
            }
        }
    }
}
