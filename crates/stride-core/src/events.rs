use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorState;

/// Every observable state change in the tracking loop produces an Event.
/// Hosts poll these for telemetry; nothing in the core acts on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A raw counter reading passed the glitch filter.
    ReadingAccepted {
        steps: i32,
        at: DateTime<Utc>,
    },
    /// The save-threshold policy fired and a checkpoint was written.
    CheckpointSaved {
        steps: i32,
        at: DateTime<Utc>,
    },
    /// First observation of a new calendar date recorded its baseline.
    BaselineCreated {
        date: NaiveDate,
        baseline: i32,
        at: DateTime<Utc>,
    },
    /// The progress display was recomputed and published.
    DisplayRefreshed {
        steps_today: i32,
        goal_reached: bool,
        at: DateTime<Utc>,
    },
    /// A periodic wake-up was armed (replacing any prior one).
    WakeScheduled {
        wake_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// The host removed the task; a short-delay restart was armed.
    RestartScheduled {
        wake_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Device shutdown was signaled; listeners were torn down.
    ShutdownComplete {
        at: DateTime<Utc>,
    },
    /// Full state snapshot for diagnostics.
    StateSnapshot {
        state: CoordinatorState,
        steps: i32,
        saved_steps: i32,
        saved_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}
