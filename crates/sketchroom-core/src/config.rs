//! Session configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timing of the reaction broadcast path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    /// How long a reaction stays visible.
    pub lifetime_ms: u64,
    /// Period of the prune task.
    pub prune_interval_ms: u64,
    /// Period of the emit task while the pointer is held.
    pub emit_interval_ms: u64,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            lifetime_ms: 4000,
            prune_interval_ms: 1000,
            emit_interval_ms: 100,
        }
    }
}

impl ReactionConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }
}

/// Local undo history limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_steps: usize,
    /// Consecutive commits closer than this merge into one step. Zero keeps
    /// every gesture separate.
    pub merge_interval_ms: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            merge_interval_ms: 0,
        }
    }
}

/// Pointer interaction tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Smallest extent a drawn shape is given when the drag was shorter.
    pub min_shape_extent: f64,
    /// Offset applied to pasted copies.
    pub paste_offset: f64,
    /// Hit-test slack around shapes and handles.
    pub hit_tolerance: f64,
    /// Longest side of an inserted image.
    pub image_max_side: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            min_shape_extent: 10.0,
            paste_offset: 20.0,
            hit_tolerance: 4.0,
            image_max_side: 200.0,
        }
    }
}

/// Configuration for a canvas session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub reactions: ReactionConfig,
    pub history: HistoryConfig,
    pub interaction: InteractionConfig,
}

impl SessionConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded session config from {}", path.as_ref().display());
        Self::from_json(&text)
    }
}
