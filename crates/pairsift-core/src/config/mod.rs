//! Configuration management for pairsift.
//!
//! Configuration is loaded from the platform config directory (or an explicit
//! path) with sensible defaults. Every section implements `Default`, and the
//! loaded `Config` is treated as immutable once handed to the pipeline.

mod types;
mod validate;

pub use types::*;

use crate::embedding::{Device, ModelVariant};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for pairsift.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Dataset layout settings
    pub dataset: DatasetConfig,

    /// Candidate extraction settings
    pub candidates: CandidateConfig,

    /// Embedding model settings
    pub embedding: EmbeddingConfig,

    /// Match acceptance settings
    pub matching: MatchingConfig,

    /// Reporting sink settings
    pub reporting: ReportingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.pairsift.pairsift/config.toml
    /// - Linux: ~/.config/pairsift/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\pairsift\config\config.toml
    ///
    /// Falls back to ~/.pairsift/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "pairsift", "pairsift")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".pairsift").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand(&self.general.model_dir)
    }

    /// Get the resolved report directory path (with ~ expansion).
    pub fn report_dir(&self) -> PathBuf {
        expand(&self.reporting.dir)
    }

    /// Path of a named perplexity language model.
    pub fn language_model_path(&self, name: &str) -> PathBuf {
        self.model_dir().join("lm").join(format!("{name}.tsv"))
    }

    /// The embedding variant selected by `model_type` / `model_name`.
    pub fn model_variant(&self) -> Result<ModelVariant, ConfigError> {
        ModelVariant::parse(&self.embedding.model_type, &self.embedding.model_name)
    }

    /// The compute device selected by `embedding.device`.
    pub fn device(&self) -> Result<Device, ConfigError> {
        Device::parse(&self.embedding.device)
    }

    /// Progress log interval in samples; 1 in debug mode.
    pub fn log_frequency(&self) -> usize {
        if self.general.debug {
            1
        } else {
            self.reporting.log_frequency
        }
    }

    /// Report flush interval in accepted rows; 1 in debug mode.
    pub fn flush_interval(&self) -> usize {
        if self.general.debug {
            1
        } else {
            self.reporting.flush_interval
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}
