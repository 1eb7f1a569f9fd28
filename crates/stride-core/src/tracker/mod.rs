mod engine;

pub use engine::{StepTracker, SAVE_OFFSET, SAVE_OFFSET_STEPS};
