//! Sync configuration
//!
//! Loaded from a JSON file; every field has a default so a partial (or empty)
//! file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard per-call limit of the destination's append primitive.
pub const DESTINATION_MAX_BATCH: usize = 100;

/// Deepest heading level the destination can render.
pub const DESTINATION_MAX_LEVEL: u8 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How a highlight is rendered in the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStyle {
    #[default]
    Plain,
    Bulleted,
    Callout,
}

/// Formatting options handed to the block compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub content_style: ContentStyle,
    /// Decorate highlights with an emoji chosen by highlight style
    pub emoji_enabled: bool,
    /// Emit the reading statistics section
    pub reading_detail_enabled: bool,
    pub review_heading: String,
    pub stats_heading: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            content_style: ContentStyle::Plain,
            emoji_enabled: false,
            reading_detail_enabled: true,
            review_heading: "Reviews".to_string(),
            stats_heading: "Reading Details".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ledger log file
    pub ledger_path: PathBuf,
    /// Blocks per append call
    pub max_batch: usize,
    /// Fixed cooldown between consecutive collaborator calls
    pub call_interval_ms: u64,
    /// Chapters deeper than this collapse onto it
    pub max_heading_level: u8,
    /// Sync books even when their sort marker is not newer than the destination's
    pub force: bool,
    pub format: FormatConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("./var/sync_read.ledger"),
            max_batch: DESTINATION_MAX_BATCH,
            call_interval_ms: 300,
            max_heading_level: DESTINATION_MAX_LEVEL,
            force: false,
            format: FormatConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch == 0 || self.max_batch > DESTINATION_MAX_BATCH {
            return Err(ConfigError::Invalid(format!(
                "max_batch must be in 1..={DESTINATION_MAX_BATCH}, got {}",
                self.max_batch
            )));
        }
        if self.max_heading_level == 0 || self.max_heading_level > DESTINATION_MAX_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "max_heading_level must be in 1..={DESTINATION_MAX_LEVEL}, got {}",
                self.max_heading_level
            )));
        }
        Ok(())
    }

    pub fn call_interval(&self) -> Duration {
        Duration::from_millis(self.call_interval_ms)
    }
}
