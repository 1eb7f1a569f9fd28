//! Trait seams for the platform collaborators the core does not own.
//!
//! The hosting environment picks one concrete implementation of each trait
//! at startup (older/newer platform facilities hide behind the same trait),
//! so the core never branches on platform version itself. All methods are
//! best-effort: the coordinator logs and swallows failures rather than
//! aborting a cycle.

use chrono::{DateTime, Duration, Utc};

/// Hint passed to [`StepSource::register`]: the source may coalesce counter
/// events for up to this long before delivering a batch.
pub const SENSOR_BATCH_LATENCY: Duration = Duration::minutes(2);

/// The system facility that delivers raw cumulative counter readings.
///
/// Readings arrive asynchronously after `register`; delivery may be batched
/// or delayed up to [`SENSOR_BATCH_LATENCY`]. Registering while already
/// registered must be a no-op (the coordinator unregisters first anyway).
pub trait StepSource {
    /// Subscribe to counter events, replacing any stale registration.
    fn register(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Drop the subscription. Must tolerate not being registered.
    fn unregister(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

/// The facility that can wake the process at a future wall-clock time even
/// while otherwise idle. At most one request is pending: a new call
/// implicitly replaces any prior one.
pub trait WakeScheduler {
    fn schedule_wake(&mut self, at: DateTime<Utc>) -> Result<(), Box<dyn std::error::Error>>;
}

/// The persistent display surface. `publish` is fire-and-forget; a failure
/// here never affects tracking state.
pub trait DisplaySurface {
    fn publish(&mut self, state: &crate::display::DisplayState)
        -> Result<(), Box<dyn std::error::Error>>;
}

/// The system shutdown broadcast. The coordinator subscribes on start so a
/// device power-off triggers a final teardown.
pub trait ShutdownReceiver {
    fn register(&mut self) -> Result<(), Box<dyn std::error::Error>>;
    fn unregister(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
