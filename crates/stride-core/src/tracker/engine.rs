//! Step tracker implementation.
//!
//! The tracker is a wall-clock-based state machine. It does not use internal
//! threads or timers -- the coordinator feeds it counter readings and
//! periodic wake-ups, passing `now` explicitly.
//!
//! The hardware counter is cumulative since the last device boot and resets
//! to zero on reboot. The tracker's job is to decide *when* an observed
//! value is worth a durable write: either the count drifted far enough from
//! the last checkpoint, or too much wall-clock time passed since it. This
//! bounds both write amplification and the data-loss window on a crash.
//!
//! ## Usage
//!
//! ```ignore
//! let mut tracker = StepTracker::new();
//! tracker.reconcile(&db);
//! // On each counter event:
//! tracker.on_reading(raw, &db, &config, &mut display, Utc::now());
//! ```

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use crate::display::DisplayState;
use crate::error::DatabaseError;
use crate::events::Event;
use crate::platform::DisplaySurface;
use crate::storage::{Checkpoint, Config, Database};

/// Persist once the count drifts this far past the last checkpoint.
pub const SAVE_OFFSET_STEPS: i32 = 30;

/// Persist at least this often while any steps have been observed.
pub const SAVE_OFFSET: Duration = Duration::minutes(15);

/// Core step tracker.
///
/// Owns the in-memory session count for the current boot session and the
/// decision of when to write it through to the store. The store remains the
/// single durable owner across process restarts; [`StepTracker::reconcile`]
/// re-reads the checkpoint on every coordinator start so a restarted
/// instance never races a stale in-memory copy.
#[derive(Debug, Clone)]
pub struct StepTracker {
    /// Latest accepted counter reading, cumulative since device boot.
    steps: i32,
    /// In-memory mirror of the persisted checkpoint.
    last_save_steps: i32,
    last_save_at: DateTime<Utc>,
}

impl Default for StepTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTracker {
    /// Create a tracker with no session history.
    ///
    /// `last_save_at` starts at the epoch, so the time-based save bound
    /// fires on the first nonzero reading of a fresh process.
    pub fn new() -> Self {
        Self {
            steps: 0,
            last_save_steps: 0,
            last_save_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Latest accepted counter reading this session.
    pub fn steps(&self) -> i32 {
        self.steps
    }

    /// The in-memory view of the last durable write.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            saved_steps: self.last_save_steps,
            saved_at: self.last_save_at,
        }
    }

    /// Steps taken today: session count minus today's recorded baseline.
    ///
    /// With no baseline row for today yet, the answer is 0 -- no history
    /// yet, don't overcount. The first persist of the day creates the row.
    pub fn steps_today(&self, db: &Database, now: DateTime<Utc>) -> i32 {
        let session = self.effective_steps(db);
        match db.steps_for_day(now.date_naive()) {
            Ok(Some(baseline)) => session - baseline,
            Ok(None) => 0,
            Err(e) => {
                warn!("failed to read today's baseline: {e}");
                0
            }
        }
    }

    /// Session count, falling back to the persisted checkpoint when this
    /// process hasn't seen a reading yet. A restart mid-day must show the
    /// last saved value, not 0, until the sensor delivers again.
    fn effective_steps(&self, db: &Database) -> i32 {
        if self.steps != 0 {
            return self.steps;
        }
        match db.current_steps() {
            Ok(saved) => saved,
            Err(e) => {
                warn!("failed to read saved steps: {e}");
                0
            }
        }
    }

    /// Save-threshold policy: persist iff the count drifted more than
    /// [`SAVE_OFFSET_STEPS`] past the checkpoint, or any steps exist and
    /// more than [`SAVE_OFFSET`] passed since the last write.
    ///
    /// Both bounds are strict: a reading exactly at `saved + 30` does not
    /// fire, and neither does a wake-up at exactly `saved_at + 15min`.
    pub fn should_persist(&self, now: DateTime<Utc>) -> bool {
        self.steps > self.last_save_steps + SAVE_OFFSET_STEPS
            || (self.steps > 0 && now > self.last_save_at + SAVE_OFFSET)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Re-read the persisted checkpoint into the in-memory mirror.
    ///
    /// Called on every coordinator start; the store is the source of truth
    /// when an old process instance may still be winding down.
    pub fn reconcile(&mut self, db: &Database) {
        match db.checkpoint() {
            Ok(Some(cp)) => {
                self.last_save_steps = cp.saved_steps;
                self.last_save_at = cp.saved_at;
            }
            Ok(None) => {}
            Err(e) => warn!("failed to reconcile checkpoint: {e}"),
        }
    }

    /// Feed one raw counter reading.
    ///
    /// Readings outside `0 ..= i32::MAX` (or non-finite) are sensor
    /// glitches: dropped with no state change and no display refresh.
    pub fn on_reading(
        &mut self,
        raw: f64,
        db: &Database,
        config: &Config,
        display: &mut dyn DisplaySurface,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        if !raw.is_finite() || raw < 0.0 || raw > i32::MAX as f64 {
            return Vec::new();
        }
        self.steps = raw as i32;
        let mut events = vec![Event::ReadingAccepted {
            steps: self.steps,
            at: now,
        }];
        events.extend(self.update_if_necessary(db, config, display, now));
        events
    }

    /// Evaluate the save-threshold policy, writing a checkpoint when it
    /// fires, then refresh the display either way so it stays live between
    /// saves.
    ///
    /// A failed write is logged and swallowed; the next event or wake-up
    /// re-evaluates against the last successful checkpoint and catches up.
    /// The emitted events contain a [`Event::CheckpointSaved`] iff a write
    /// occurred.
    pub fn update_if_necessary(
        &mut self,
        db: &Database,
        config: &Config,
        display: &mut dyn DisplaySurface,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        if self.should_persist(now) {
            match self.persist(db, now) {
                Ok(saved) => {
                    debug!("checkpoint saved at {} steps", self.steps);
                    events.extend(saved);
                }
                Err(e) => warn!("checkpoint write failed, retrying next cycle: {e}"),
            }
        }
        events.extend(self.refresh_display(db, config, display, now));
        events
    }

    /// Unconditional best-effort checkpoint write, used by the shutdown
    /// flush. Does nothing with no steps observed.
    pub fn flush(&mut self, db: &Database, now: DateTime<Utc>) -> Vec<Event> {
        if self.steps == 0 {
            return Vec::new();
        }
        match self.persist(db, now) {
            Ok(events) => events,
            Err(e) => {
                warn!("shutdown flush failed: {e}");
                Vec::new()
            }
        }
    }

    /// Write today's baseline (first observation of the date only) and the
    /// checkpoint record.
    fn persist(&mut self, db: &Database, now: DateTime<Utc>) -> Result<Vec<Event>, DatabaseError> {
        let mut events = Vec::new();
        let today = now.date_naive();
        if db.steps_for_day(today)?.is_none() {
            db.insert_new_day(today, self.steps)?;
            events.push(Event::BaselineCreated {
                date: today,
                baseline: self.steps,
                at: now,
            });
        }
        db.save_current_steps(self.steps, now)?;
        self.last_save_steps = self.steps;
        self.last_save_at = now;
        events.push(Event::CheckpointSaved {
            steps: self.steps,
            at: now,
        });
        Ok(events)
    }

    /// Recompute and publish the progress display.
    ///
    /// Publishing is fire-and-forget: a failure (or a disabled notification
    /// flag) never affects tracking state.
    pub fn refresh_display(
        &self,
        db: &Database,
        config: &Config,
        display: &mut dyn DisplaySurface,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let session = self.effective_steps(db);
        let steps_today = self.steps_today(db, now);
        let state = DisplayState::build(session, steps_today, config);
        if config.notifications.enabled {
            if let Err(e) = display.publish(&state) {
                warn!("display publish failed: {e}");
            }
        }
        vec![Event::DisplayRefreshed {
            steps_today: state.steps_today,
            goal_reached: state.goal_reached,
            at: now,
        }]
    }
}
