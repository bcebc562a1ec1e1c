//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    ///
    /// Also resolves the model variant and device so that an unknown model
    /// type, model name or device string fails here rather than mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.candidates.ngram_range.check()?;
        if self.candidates.split_marker.is_empty() {
            return Err(ConfigError::ValidationError(
                "candidates.split_marker must not be empty".into(),
            ));
        }
        let ppl = self.candidates.perplexity_threshold;
        if ppl.is_nan() || ppl <= 0.0 {
            return Err(ConfigError::ValidationError(
                "candidates.perplexity_threshold must be > 0".into(),
            ));
        }
        if self.embedding.max_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.max_batch_size must be > 0".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.matching.threshold) {
            return Err(ConfigError::ValidationError(
                "matching.threshold must be between -1.0 and 1.0".into(),
            ));
        }
        if self.reporting.flush_interval == 0 {
            return Err(ConfigError::ValidationError(
                "reporting.flush_interval must be > 0".into(),
            ));
        }
        if self.reporting.log_frequency == 0 {
            return Err(ConfigError::ValidationError(
                "reporting.log_frequency must be > 0".into(),
            ));
        }
        if self.reporting.preview_size == 0 {
            return Err(ConfigError::ValidationError(
                "reporting.preview_size must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        self.model_variant()?;
        self.device()?;
        Ok(())
    }
}
