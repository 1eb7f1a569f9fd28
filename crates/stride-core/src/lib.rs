//! # Stride Core Library
//!
//! This library provides the core logic for Stride, a background step
//! tracker. The hardware step counter is cumulative since the last device
//! boot and resets to zero on reboot; the hosting process may be killed and
//! restarted at any time. The core keeps a durable, day-scoped step total
//! and a live progress display alive through all of that, without excessive
//! storage writes or notification churn.
//!
//! ## Architecture
//!
//! - **Step Tracker**: a wall-clock-based state machine deciding when an
//!   observed counter value warrants a durable write (step-delta or
//!   time-interval bound, whichever fires first)
//! - **Storage**: SQLite-based daily baselines and checkpoint, TOML-based
//!   preferences
//! - **Coordinator**: lifecycle state machine that re-registers for counter
//!   events on every (re)start and arms the periodic wake-up
//! - **Platform seams**: traits for the counter event source, wake-up
//!   scheduler, display surface, and shutdown broadcast; the host picks the
//!   concrete implementations once at startup
//!
//! ## Key Components
//!
//! - [`StepTracker`]: save-threshold policy and day rollover
//! - [`ScheduleCoordinator`]: lifecycle transitions
//! - [`Database`]: baseline and checkpoint persistence
//! - [`Config`]: goal and message preferences

pub mod coordinator;
pub mod display;
pub mod error;
pub mod events;
pub mod platform;
pub mod storage;
pub mod tracker;

pub use coordinator::{CoordinatorState, ScheduleCoordinator, RESTART_DELAY};
pub use display::DisplayState;
pub use error::{ConfigError, CoreError, DatabaseError};
pub use events::Event;
pub use platform::{DisplaySurface, ShutdownReceiver, StepSource, WakeScheduler};
pub use storage::{Checkpoint, Config, Database};
pub use tracker::{StepTracker, SAVE_OFFSET, SAVE_OFFSET_STEPS};
