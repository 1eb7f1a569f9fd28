//! Lifecycle coordinator for the step tracker.
//!
//! The coordinator keeps the tracker alive across process death. It turns
//! the host's lifecycle callbacks into explicit state-machine transitions,
//! so every transition is testable without a real OS host:
//!
//! ```text
//! Idle ──start──▶ Armed ──start──▶ Armed   (re-entry replaces the wake-up)
//!                  │  task_removed: arm an immediate restart, stay Armed
//!                  └──shutdown──▶ Shutdown
//! ```
//!
//! `start` is re-entered on every process restart, crash recovery, and
//! scheduled wake-up; there is no terminal state other than explicit
//! `shutdown`. A missed wake-up is harmless -- the next start or reading
//! re-evaluates the save thresholds against the last checkpoint and catches
//! up.
//!
//! The host opens the store for each transition and drops it afterwards, so
//! every open/read/write cycle is a short-lived exclusive section and no
//! lock is held across the event-to-persist path.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::platform::{DisplaySurface, ShutdownReceiver, StepSource, WakeScheduler};
use crate::storage::{Config, Database};
use crate::tracker::{StepTracker, SAVE_OFFSET};

/// Delay before the restart wake-up armed when the host removes the task.
pub const RESTART_DELAY: Duration = Duration::milliseconds(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    Idle,
    Armed,
    Shutdown,
}

/// Drives the [`StepTracker`] lifecycle: (re-)registration, the periodic
/// wake-up, and the shutdown flush. No tracking logic of its own.
pub struct ScheduleCoordinator {
    tracker: StepTracker,
    source: Box<dyn StepSource>,
    scheduler: Box<dyn WakeScheduler>,
    display: Box<dyn DisplaySurface>,
    shutdown_rx: Box<dyn ShutdownReceiver>,
    state: CoordinatorState,
}

impl ScheduleCoordinator {
    pub fn new(
        source: Box<dyn StepSource>,
        scheduler: Box<dyn WakeScheduler>,
        display: Box<dyn DisplaySurface>,
        shutdown_rx: Box<dyn ShutdownReceiver>,
    ) -> Self {
        Self {
            tracker: StepTracker::new(),
            source,
            scheduler,
            display,
            shutdown_rx,
            state: CoordinatorState::Idle,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Event {
        let cp = self.tracker.checkpoint();
        Event::StateSnapshot {
            state: self.state,
            steps: self.tracker.steps(),
            saved_steps: cp.saved_steps,
            saved_at: cp.saved_at,
            at: now,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Activation: called on process start, crash recovery, and every
    /// scheduled wake-up.
    ///
    /// Re-registers the counter listener (replacing any stale
    /// registration), subscribes to the shutdown broadcast, reconciles the
    /// checkpoint from the store, runs one save-policy pass so the display
    /// refreshes even with no new reading, and arms exactly one wake-up at
    /// `min(start_of_next_day, now + SAVE_OFFSET)`. The day bound
    /// guarantees at least one wake-up per calendar date, so the baseline
    /// rollover happens promptly even with zero motion.
    ///
    /// Registration failures are logged and swallowed; the next wake-up
    /// retries. Duplicate starts are harmless.
    pub fn start(&mut self, db: &Database, config: &Config, now: DateTime<Utc>) -> Vec<Event> {
        if let Err(e) = self.source.unregister() {
            warn!("stale listener unregister failed: {e}");
        }
        if let Err(e) = self.source.register() {
            warn!("counter listener registration failed: {e}");
        }
        if let Err(e) = self.shutdown_rx.register() {
            warn!("shutdown receiver registration failed: {e}");
        }

        self.tracker.reconcile(db);
        let mut events = self
            .tracker
            .update_if_necessary(db, config, &mut *self.display, now);

        let wake_at = start_of_next_day(now).min(now + SAVE_OFFSET);
        match self.scheduler.schedule_wake(wake_at) {
            Ok(()) => events.push(Event::WakeScheduled { wake_at, at: now }),
            Err(e) => warn!("failed to arm wake-up: {e}"),
        }

        self.state = CoordinatorState::Armed;
        events
    }

    /// A raw counter reading arrived from the source. Ignored after
    /// shutdown (a stale delivery from an unregistered listener).
    pub fn on_reading(
        &mut self,
        raw: f64,
        _accuracy: i32,
        db: &Database,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        if self.state == CoordinatorState::Shutdown {
            return Vec::new();
        }
        self.tracker
            .on_reading(raw, db, config, &mut *self.display, now)
    }

    /// The host environment removed the task. Arms an immediate restart
    /// wake-up, independent of the normal save schedule, to minimize the
    /// coverage gap. Ignored after shutdown -- no further scheduling.
    pub fn task_removed(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if self.state == CoordinatorState::Shutdown {
            return Vec::new();
        }
        let wake_at = now + RESTART_DELAY;
        match self.scheduler.schedule_wake(wake_at) {
            Ok(()) => vec![Event::RestartScheduled { wake_at, at: now }],
            Err(e) => {
                warn!("failed to arm restart wake-up: {e}");
                Vec::new()
            }
        }
    }

    /// The device is powering off. Flushes a final checkpoint and tears
    /// down both registrations; teardown is best-effort and errors are
    /// swallowed. No further scheduling.
    pub fn shutdown(&mut self, db: &Database, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = self.tracker.flush(db, now);
        if let Err(e) = self.source.unregister() {
            warn!("listener unregister failed: {e}");
        }
        if let Err(e) = self.shutdown_rx.unregister() {
            warn!("shutdown receiver unregister failed: {e}");
        }
        self.state = CoordinatorState::Shutdown;
        events.push(Event::ShutdownComplete { at: now });
        events
    }
}

/// Midnight at the start of the next calendar date.
fn start_of_next_day(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Duration::days(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayState;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Register,
        Unregister,
        ShutdownRegister,
        ShutdownUnregister,
    }

    #[derive(Default, Clone)]
    struct Shared {
        calls: Arc<Mutex<Vec<Call>>>,
        wakes: Arc<Mutex<Vec<DateTime<Utc>>>>,
        published: Arc<Mutex<Vec<DisplayState>>>,
        fail_register: Arc<Mutex<bool>>,
    }

    struct FakeSource(Shared);
    impl StepSource for FakeSource {
        fn register(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            if *self.0.fail_register.lock().unwrap() {
                return Err("sensor unavailable".into());
            }
            self.0.calls.lock().unwrap().push(Call::Register);
            Ok(())
        }
        fn unregister(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.0.calls.lock().unwrap().push(Call::Unregister);
            Ok(())
        }
    }

    struct FakeScheduler(Shared);
    impl WakeScheduler for FakeScheduler {
        fn schedule_wake(
            &mut self,
            at: DateTime<Utc>,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.0.wakes.lock().unwrap().push(at);
            Ok(())
        }
    }

    struct FakeDisplay(Shared);
    impl DisplaySurface for FakeDisplay {
        fn publish(
            &mut self,
            state: &DisplayState,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.0.published.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    struct FakeShutdownRx(Shared);
    impl ShutdownReceiver for FakeShutdownRx {
        fn register(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.0.calls.lock().unwrap().push(Call::ShutdownRegister);
            Ok(())
        }
        fn unregister(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.0.calls.lock().unwrap().push(Call::ShutdownUnregister);
            Ok(())
        }
    }

    fn coordinator() -> (ScheduleCoordinator, Shared) {
        let shared = Shared::default();
        let c = ScheduleCoordinator::new(
            Box::new(FakeSource(shared.clone())),
            Box::new(FakeScheduler(shared.clone())),
            Box::new(FakeDisplay(shared.clone())),
            Box::new(FakeShutdownRx(shared.clone())),
        );
        (c, shared)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    }

    #[test]
    fn start_registers_refreshes_and_arms() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, shared) = coordinator();

        let events = c.start(&db, &cfg, t0());
        assert_eq!(c.state(), CoordinatorState::Armed);
        assert_eq!(
            *shared.calls.lock().unwrap(),
            vec![Call::Unregister, Call::Register, Call::ShutdownRegister]
        );
        // Display refreshed even though no reading has arrived.
        assert_eq!(shared.published.lock().unwrap().len(), 1);
        // Mid-morning: the 15-minute bound is sooner than midnight.
        assert_eq!(*shared.wakes.lock().unwrap(), vec![t0() + SAVE_OFFSET]);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::WakeScheduled { .. })));
    }

    #[test]
    fn wake_up_is_bounded_by_start_of_next_day() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, shared) = coordinator();

        // 23:55 -- midnight is closer than now + 15min.
        let late = Utc.with_ymd_and_hms(2026, 3, 14, 23, 55, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        c.start(&db, &cfg, late);
        assert_eq!(*shared.wakes.lock().unwrap(), vec![midnight]);
    }

    #[test]
    fn restart_replaces_pending_wake_up() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, shared) = coordinator();

        c.start(&db, &cfg, t0());
        c.start(&db, &cfg, t0() + SAVE_OFFSET);
        // One request per start; the scheduler contract replaces the prior.
        let wakes = shared.wakes.lock().unwrap();
        assert_eq!(wakes.len(), 2);
        assert_eq!(*wakes.last().unwrap(), t0() + SAVE_OFFSET + SAVE_OFFSET);
    }

    #[test]
    fn start_survives_registration_failure() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, shared) = coordinator();
        *shared.fail_register.lock().unwrap() = true;

        let events = c.start(&db, &cfg, t0());
        // Still armed, display still refreshed.
        assert_eq!(c.state(), CoordinatorState::Armed);
        assert_eq!(shared.published.lock().unwrap().len(), 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::WakeScheduled { .. })));
    }

    #[test]
    fn readings_flow_through_to_the_tracker() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, _shared) = coordinator();
        c.start(&db, &cfg, t0());

        c.on_reading(120.0, 3, &db, &cfg, t0() + Duration::minutes(1));
        assert_eq!(c.tracker().steps(), 120);
        assert_eq!(db.current_steps().unwrap(), 120);
    }

    #[test]
    fn task_removed_arms_short_restart() {
        let (mut c, shared) = coordinator();
        let events = c.task_removed(t0());
        assert_eq!(*shared.wakes.lock().unwrap(), vec![t0() + RESTART_DELAY]);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::RestartScheduled { .. })));
    }

    #[test]
    fn shutdown_flushes_and_tears_down() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, shared) = coordinator();
        c.start(&db, &cfg, t0());
        c.on_reading(42.0, 3, &db, &cfg, t0());

        // Drift below both thresholds, then shut down.
        c.on_reading(50.0, 3, &db, &cfg, t0() + Duration::minutes(1));
        let events = c.shutdown(&db, t0() + Duration::minutes(2));

        assert_eq!(c.state(), CoordinatorState::Shutdown);
        assert_eq!(db.current_steps().unwrap(), 50);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ShutdownComplete { .. })));
        let calls = shared.calls.lock().unwrap();
        assert_eq!(
            calls[calls.len() - 2..],
            [Call::Unregister, Call::ShutdownUnregister]
        );
    }

    #[test]
    fn readings_after_shutdown_are_ignored() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, _shared) = coordinator();
        c.start(&db, &cfg, t0());
        c.shutdown(&db, t0());

        let events = c.on_reading(999.0, 3, &db, &cfg, t0() + Duration::minutes(1));
        assert!(events.is_empty());
        assert_eq!(c.tracker().steps(), 0);
    }

    #[test]
    fn task_removed_after_shutdown_schedules_nothing() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, shared) = coordinator();
        c.start(&db, &cfg, t0());
        c.shutdown(&db, t0());
        shared.wakes.lock().unwrap().clear();

        let events = c.task_removed(t0() + Duration::seconds(1));
        assert!(events.is_empty());
        assert!(shared.wakes.lock().unwrap().is_empty());
    }

    #[test]
    fn start_after_shutdown_rearms() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, _shared) = coordinator();
        c.start(&db, &cfg, t0());
        c.shutdown(&db, t0());
        c.start(&db, &cfg, t0() + Duration::hours(1));
        assert_eq!(c.state(), CoordinatorState::Armed);
    }

    #[test]
    fn snapshot_reports_checkpoint() {
        let db = Database::open_memory().unwrap();
        let cfg = Config::default();
        let (mut c, _shared) = coordinator();
        c.start(&db, &cfg, t0());
        c.on_reading(77.0, 3, &db, &cfg, t0());

        match c.snapshot(t0()) {
            Event::StateSnapshot {
                state,
                steps,
                saved_steps,
                ..
            } => {
                assert_eq!(state, CoordinatorState::Armed);
                assert_eq!(steps, 77);
                assert_eq!(saved_steps, 77);
            }
            _ => panic!("Expected StateSnapshot"),
        }
    }
}
