//! Event source -> bus -> scheduler/dispatcher/shutdown, wired the way the
//! daemon wires them, with in-test fakes only.

use pibackup_core::source::{join_thread, stop_thread};
use pibackup_core::{
    Action, ActionKey, BusyIndicator, ButtonEvent, ButtonId, DebounceScheduler, Dispatcher, Event,
    EventBus, EventSource, IndicatorId, IndicatorPanel, LongPressDetector, ManualClock, Outcome,
    ShutdownCoordinator, ShutdownReason, ShutdownState, SourceError, SourceThread, Trigger,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

const POWER: ButtonId = ButtonId::new("Back");
const CATALOG: ActionKey = ActionKey::new("catalog-sync");

#[derive(Default)]
struct Panel {
    writes: Mutex<Vec<(IndicatorId, bool)>>,
    all_off: AtomicUsize,
}

impl IndicatorPanel for Panel {
    fn set(&self, id: IndicatorId, on: bool) {
        self.writes.lock().unwrap().push((id, on));
    }

    fn all_off(&self) {
        self.all_off.fetch_add(1, Ordering::SeqCst);
    }
}

/// Publishes a fixed list of events from its own thread, then idles.
struct ReplaySource {
    bus: Arc<EventBus>,
    events: Vec<(Duration, Event)>,
    thread: Option<SourceThread>,
}

impl EventSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn start(&mut self) -> Result<(), SourceError> {
        let bus = Arc::clone(&self.bus);
        let events = std::mem::take(&mut self.events);
        self.thread = Some(SourceThread::spawn("replay", move |stop| {
            for (pause, event) in events {
                thread::sleep(pause);
                bus.publish(event);
            }
            while !stop.is_stopped() {
                thread::sleep(Duration::from_millis(5));
            }
        })?);
        Ok(())
    }

    fn stop(&self) {
        stop_thread(&self.thread);
    }

    fn join(&mut self, timeout: Duration) -> Result<(), SourceError> {
        join_thread(&mut self.thread, timeout)
    }
}

struct CountingAction {
    runs: AtomicUsize,
}

impl Action for CountingAction {
    fn key(&self) -> ActionKey {
        CATALOG
    }

    fn indicator(&self) -> IndicatorId {
        IndicatorId::new("D")
    }

    fn run(&self, trigger: &Trigger) -> anyhow::Result<()> {
        assert_eq!(*trigger, Trigger::Scheduled);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_share_change_burst_runs_catalog_sync_once() {
    let clock = Arc::new(ManualClock::new());
    let scheduler = Arc::new(DebounceScheduler::with_clock(clock.clone()));
    let panel = Arc::new(Panel::default());
    let action = Arc::new(CountingAction {
        runs: AtomicUsize::new(0),
    });
    let mut dispatcher = Dispatcher::new(BusyIndicator::new(panel.clone(), Duration::from_millis(5)));
    dispatcher.register(action.clone());

    let bus = EventBus::new();
    {
        let scheduler = Arc::clone(&scheduler);
        bus.subscribe(move |event| {
            if let Event::ShareChanged(_) = event {
                scheduler.schedule(Duration::from_secs(20));
            }
        });
    }

    for i in 0..25 {
        bus.publish(Event::ShareChanged(PathBuf::from(format!("/share/drive/{}.jpg", i))));
        clock.advance(Duration::from_secs(1));
    }

    let mut outcomes = Vec::new();
    for _ in 0..30 {
        if scheduler.pop_due() {
            outcomes.push(dispatcher.run_blocking(CATALOG, &Trigger::Scheduled).unwrap());
        }
        clock.advance(Duration::from_secs(1));
    }

    assert_eq!(outcomes, vec![Outcome::Completed]);
    assert_eq!(action.runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        panel.writes.lock().unwrap().last(),
        Some(&(IndicatorId::new("D"), false))
    );
}

#[test]
fn test_long_press_on_source_thread_shuts_everything_down() {
    let panel = Arc::new(Panel::default());
    let coordinator = Arc::new(ShutdownCoordinator::new(
        panel.clone(),
        Duration::from_secs(2),
    ));
    let bus = Arc::new(EventBus::new());

    let weak: Weak<ShutdownCoordinator> = Arc::downgrade(&coordinator);
    let detector = Arc::new(LongPressDetector::new(
        POWER,
        Duration::from_millis(20),
        true,
        panel.clone(),
        move |_| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.shutdown(ShutdownReason::PowerButton);
            }
        },
    ));
    {
        let detector = Arc::clone(&detector);
        bus.subscribe(move |event| {
            if let Event::Button(button) = event {
                detector.handle(button);
            }
        });
    }

    let replay = ReplaySource {
        bus: Arc::clone(&bus),
        events: vec![
            (Duration::from_millis(10), Event::Button(ButtonEvent::touch(POWER))),
            (Duration::from_millis(60), Event::Button(ButtonEvent::release(POWER))),
        ],
        thread: None,
    };
    assert!(coordinator.launch(Box::new(replay)));

    assert!(coordinator.exit_signal().wait_timeout(Duration::from_secs(5)));
    assert!(coordinator.wait_stopped(Duration::from_secs(5)));
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
    assert_eq!(coordinator.reason(), Some(ShutdownReason::PowerButton));
    assert_eq!(panel.all_off.load(Ordering::SeqCst), 1);

    // A later signal is a no-op.
    assert!(!coordinator.shutdown(ShutdownReason::Signal));
    assert_eq!(coordinator.reason(), Some(ShutdownReason::PowerButton));
}
