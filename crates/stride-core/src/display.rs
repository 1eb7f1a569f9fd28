//! Progress display derivation.
//!
//! Turns the current session count, today's baseline, and the configured
//! goal into the user-facing progress state. The display is derived, never
//! stored: every refresh recomputes it from scratch, so repeated refreshes
//! with unchanged inputs are idempotent. Publishing is best-effort -- the
//! display is not authoritative state.

use serde::{Deserialize, Serialize};

use crate::storage::Config;

/// Derived user-facing progress state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    /// Steps taken today (session count minus today's baseline).
    pub steps_today: i32,
    /// The configured daily goal.
    pub goal: i32,
    pub goal_reached: bool,
    /// Progress toward the goal, 0.0 .. 1.0 (clamped).
    pub progress: f64,
    /// Always-on title line.
    pub title: String,
    /// Progress body, built from the configured templates.
    pub message: String,
}

impl DisplayState {
    /// Build the display state from the raw session count and the derived
    /// steps-today value.
    ///
    /// Three message states:
    /// - no accepted reading yet (`session_steps == 0`): the "no data" text
    /// - `steps_today >= max(goal, 1)`: the "goal reached" text
    /// - otherwise: the "steps to go" text
    ///
    /// A goal of 0 (or less) is treated as 1 so an untouched counter does
    /// not count as an instantly reached goal.
    pub fn build(session_steps: i32, steps_today: i32, config: &Config) -> Self {
        let goal = config.goal;
        let effective_goal = goal.max(1);
        let goal_reached = session_steps > 0 && steps_today >= effective_goal;

        let message = if session_steps == 0 {
            config.messages.no_data.clone()
        } else if goal_reached {
            render(&config.messages.goal_reached, steps_today, goal)
        } else {
            render(&config.messages.steps_to_go, steps_today, goal)
        };

        let progress = if effective_goal > 0 && session_steps > 0 {
            (steps_today.max(0) as f64 / effective_goal as f64).min(1.0)
        } else {
            0.0
        };

        Self {
            steps_today,
            goal,
            goal_reached,
            progress,
            title: config.messages.counting_title.clone(),
            message,
        }
    }
}

/// Substitute `{steps}`, `{goal}` and `{to_go}` placeholders.
fn render(template: &str, steps_today: i32, goal: i32) -> String {
    template
        .replace("{steps}", &group_thousands(steps_today))
        .replace("{goal}", &group_thousands(goal))
        .replace("{to_go}", &group_thousands(goal.saturating_sub(steps_today)))
}

/// Format a count with thousands separators (`12345` -> `12,345`).
pub fn group_thousands(n: i32) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    let first = digits.len() % 3;
    let mut written = 0;
    if first > 0 {
        out.push_str(&digits[..first]);
        written = first;
    }
    while written < digits.len() {
        if written > 0 {
            out.push(',');
        }
        out.push_str(&digits[written..written + 3]);
        written += 3;
    }
    out
}
