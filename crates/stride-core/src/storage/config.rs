//! TOML-based user preferences.
//!
//! Stores the daily step goal, the progress message templates, and the
//! notification toggle. Configuration is stored at
//! `~/.config/stride/config.toml` and is read-only to the tracking core --
//! it is loaded fresh at the start of each cycle so an external edit takes
//! effect on the next wake-up.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::{ConfigError, Result};

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Progress message templates.
///
/// Templates use named placeholders: `{steps}` (steps taken today),
/// `{goal}` (the configured goal) and `{to_go}` (steps remaining).
/// Counts are substituted with thousands separators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_counting_title")]
    pub counting_title: String,
    #[serde(default = "default_goal_reached")]
    pub goal_reached: String,
    #[serde(default = "default_steps_to_go")]
    pub steps_to_go: String,
    #[serde(default = "default_no_data")]
    pub no_data: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/stride/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_goal")]
    pub goal: i32,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

// Default functions
fn default_goal() -> i32 {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_counting_title() -> String {
    "Pedometer is counting".into()
}
fn default_goal_reached() -> String {
    "{steps} steps today".into()
}
fn default_steps_to_go() -> String {
    "{to_go} steps to go".into()
}
fn default_no_data() -> String {
    "Your progress will be shown here soon".into()
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            counting_title: default_counting_title(),
            goal_reached: default_goal_reached(),
            steps_to_go: default_steps_to_go(),
            no_data: default_no_data(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            goal: default_goal(),
            notifications: NotificationsConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, std::io::Error> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path,
                        message: e.to_string(),
                    })?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        let path = Self::path()?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
