use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse editor config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{field}` must be greater than zero")]
    Zero { field: &'static str },
}

/// Session tunables. Every field is optional in the JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo entries kept before the oldest is dropped.
    pub max_undo: usize,
    /// Base fix limit for one normalization run; the tree size adds to it.
    pub max_normalize_iterations: usize,
    pub autosave_delay_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo: 200,
            max_normalize_iterations: 1000,
            autosave_delay_ms: 1500,
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_undo == 0 {
            return Err(ConfigError::Zero { field: "max_undo" });
        }
        if self.max_normalize_iterations == 0 {
            return Err(ConfigError::Zero {
                field: "max_normalize_iterations",
            });
        }
        if self.autosave_delay_ms == 0 {
            return Err(ConfigError::Zero {
                field: "autosave_delay_ms",
            });
        }
        Ok(())
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }
}
