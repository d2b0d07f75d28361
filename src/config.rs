//! Configuration loading
//!
//! Every section is optional in the TOML file and falls back to its default.

use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Largest accepted image upload, 5 MiB.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const MAX_IMAGES_PER_OFFER: usize = 3;
pub const ALLOWED_IMAGE_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub media: MediaLimits,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Throw the database away when the last handle drops.
    pub temporary: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts made after a version conflict before surfacing it to the caller.
    pub max_conflict_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MediaLimits {
    pub max_images_per_offer: usize,
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/barter.db"),
            temporary: false,
        }
    }
}

impl StorageConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_images_per_offer: MAX_IMAGES_PER_OFFER,
            max_file_size: MAX_FILE_SIZE,
            allowed_mime_types: ALLOWED_IMAGE_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl MarketConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;

        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), "Loaded market configuration");

        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> MarketResult<Self> {
        let config: MarketConfig =
            toml::from_str(raw).map_err(|e| MarketError::Config(e.to_string()))?;
        config.validate()?;
        debug!(?config, "Parsed market configuration");

        Ok(config)
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.media.max_images_per_offer == 0 {
            return Err(MarketError::Config(
                "media.max_images_per_offer must be at least 1".into(),
            ));
        }
        if self.media.max_file_size == 0 {
            return Err(MarketError::Config(
                "media.max_file_size must be positive".into(),
            ));
        }
        if self.media.allowed_mime_types.is_empty() {
            return Err(MarketError::Config(
                "media.allowed_mime_types cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = MarketConfig::from_toml_str("").unwrap();
        assert_eq!(config, MarketConfig::default());
        assert_eq!(config.media.max_file_size, 5_242_880);
        assert_eq!(config.engine.max_conflict_retries, 5);
    }

    #[test]
    fn partial_sections_override() {
        let config = MarketConfig::from_toml_str(
            r#"
            [storage]
            path = "/tmp/market.db"

            [engine]
            max_conflict_retries = 2

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/tmp/market.db"));
        assert!(!config.storage.temporary);
        assert_eq!(config.engine.max_conflict_retries, 2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.media, MediaLimits::default());
    }

    #[test]
    fn rejects_zero_image_limit() {
        let err = MarketConfig::from_toml_str("[media]\nmax_images_per_offer = 0\n").unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }
}
