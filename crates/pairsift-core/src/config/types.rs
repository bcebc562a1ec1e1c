//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where ONNX models and language models are stored
    pub model_dir: PathBuf,

    /// Debug mode: progress line and report flush after every sample
    pub debug: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.pairsift/models"),
            debug: false,
        }
    }
}

/// Dataset layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Image extensions recognized as sample images
    pub image_extensions: Vec<String>,

    /// Extension of the caption file sitting next to each image
    pub caption_extension: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_extensions: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
            ],
            caption_extension: "txt".to_string(),
        }
    }
}

/// Inclusive range of n-gram lengths, in whitespace tokens.
///
/// Serialized as a two-element array (`ngram_range = [3, 20]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct NgramRange {
    pub min: usize,
    pub max: usize,
}

impl NgramRange {
    /// Build a validated range: `1 <= min <= max`.
    pub fn new(min: usize, max: usize) -> Result<Self, ConfigError> {
        let range = Self { min, max };
        range.check()?;
        Ok(range)
    }

    pub(crate) fn check(&self) -> Result<(), ConfigError> {
        if self.min < 1 {
            return Err(ConfigError::ValidationError(format!(
                "candidates.ngram_range minimum must be >= 1 (got {})",
                self.min
            )));
        }
        if self.min > self.max {
            return Err(ConfigError::ValidationError(format!(
                "candidates.ngram_range minimum {} exceeds maximum {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Iterate over every n in the range.
    pub fn lengths(&self) -> std::ops::RangeInclusive<usize> {
        self.min..=self.max
    }
}

impl From<(usize, usize)> for NgramRange {
    fn from((min, max): (usize, usize)) -> Self {
        Self { min, max }
    }
}

impl From<NgramRange> for (usize, usize) {
    fn from(range: NgramRange) -> Self {
        (range.min, range.max)
    }
}

/// Candidate phrase extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Inclusive n-gram length range
    pub ngram_range: NgramRange,

    /// Marker separating the "before" and "after" halves of a caption
    pub split_marker: String,

    /// Drop phrases whose detected language differs from their span's
    pub filter_by_language: bool,

    /// Language code reported for any non-blank text by the built-in detector
    pub assumed_language: String,

    /// Name of the perplexity language model (`{model_dir}/lm/{name}.tsv`).
    /// `None` disables perplexity filtering.
    pub perplexity_lm_name: Option<String>,

    /// Phrases with perplexity above this value are dropped
    pub perplexity_threshold: f64,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            ngram_range: NgramRange { min: 3, max: 20 },
            split_marker: "<SPLIT>".to_string(),
            filter_by_language: false,
            assumed_language: "en".to_string(),
            perplexity_lm_name: None,
            perplexity_threshold: 1000.0,
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend family: "open_clip", "sentence_transformers" or
    /// "xlm_roberta_large_vit_l14"
    pub model_type: String,

    /// Model name, only meaningful for "open_clip"
    /// ("ViT-B-32-quickgelu" or "xlm-roberta-large-ViT-H-14")
    pub model_name: String,

    /// Compute device: "cpu", "cuda" or "cuda:N"
    pub device: String,

    /// Largest number of texts sent to one inference call
    pub max_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_type: "open_clip".to_string(),
            model_name: "ViT-B-32-quickgelu".to_string(),
            device: "cpu".to_string(),
            max_batch_size: 1024,
        }
    }
}

/// Match acceptance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum cosine similarity for a best candidate to count as a match
    pub threshold: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { threshold: 0.3 }
    }
}

/// Reporting sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Whether tables are pushed to the report directory at all
    pub enabled: bool,

    /// Report output directory
    pub dir: PathBuf,

    /// Flush tables every N accepted rows. Each flush rewrites the whole
    /// prediction table, so small values get expensive on long runs.
    pub flush_interval: usize,

    /// Emit a progress log line every N samples
    pub log_frequency: usize,

    /// Longest edge of preview images stored in the predictions table
    pub preview_size: u32,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("./pairsift-report"),
            flush_interval: 1000,
            log_frequency: 10,
            preview_size: 128,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum image file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
        }
    }
}

impl LimitsConfig {
    /// `max_file_size_mb` in bytes, saturating at `u64::MAX`.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ngram_range_rejects_zero_min() {
        let err = NgramRange::new(0, 3).unwrap_err();
        assert!(err.to_string().contains(">= 1"));
    }

    #[test]
    fn test_ngram_range_rejects_inverted() {
        let err = NgramRange::new(4, 2).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_ngram_range_toml_array() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            ngram_range: NgramRange,
        }
        let parsed: Wrapper = toml::from_str("ngram_range = [1, 2]").unwrap();
        assert_eq!(parsed.ngram_range, NgramRange { min: 1, max: 2 });
        assert_eq!(parsed.ngram_range.lengths().collect::<Vec<_>>(), vec![1, 2]);

        let out = toml::to_string(&parsed).unwrap();
        assert!(out.contains("ngram_range = [1, 2]"));
    }
}
