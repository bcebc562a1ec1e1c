//! Error types for the pairsift scoring pipeline.
//!
//! Errors are organized by stage. Per-sample data problems are recoverable
//! (the driver skips the sample and counts it); everything else is fatal and
//! terminates the run.

use thiserror::Error;

/// Top-level error type for pairsift operations.
#[derive(Error, Debug)]
pub enum PairsiftError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {key}: {message}")]
    Decode { key: String, message: String },

    /// Image dimensions exceed limit
    #[error("Image too large: {key} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        key: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Raw record could not be read from the dataset
    #[error("Unreadable sample {key}: {message}")]
    Sample { key: String, message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {key} after {timeout_ms}ms")]
    Timeout {
        key: String,
        stage: String,
        timeout_ms: u64,
    },

    /// Model loading or inference failed
    #[error("Model error: {message}")]
    Model { message: String },

    /// Embedding width differs from the width the backend was configured with
    #[error("Embedding dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// A batch exceeded the inference ceiling or the device ran out of memory
    #[error("Resource exhausted: {message}")]
    ResourceExhausted { message: String },

    /// A degenerate embedding (zero norm) reached normalization
    #[error("Numeric error: zero-norm {what} embedding")]
    ZeroNorm { what: String },

    /// Scoring was invoked without candidates
    #[error("Cannot score an empty candidate list")]
    EmptyCandidates,

    /// Perplexity or language model failed to load
    #[error("Language model error: {message}")]
    LanguageModel { message: String },
}

impl PipelineError {
    /// Whether the driver may skip the current sample and keep going.
    ///
    /// Recoverable: anything tied to one sample's data (bad image bytes,
    /// decode timeouts, oversize images, unreadable captions). Fatal:
    /// configuration, model, resource and numeric errors.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::Decode { .. }
            | PipelineError::ImageTooLarge { .. }
            | PipelineError::Sample { .. } => true,
            PipelineError::Timeout { stage, .. } => stage == "decode",
            _ => false,
        }
    }

    /// Build a model error, promoting runtime allocation failures to
    /// [`PipelineError::ResourceExhausted`].
    pub(crate) fn from_inference(context: &str, message: impl std::fmt::Display) -> Self {
        let message = format!("{context}: {message}");
        let lower = message.to_lowercase();
        if lower.contains("out of memory")
            || lower.contains("failed to allocate")
            || lower.contains("bad_alloc")
        {
            PipelineError::ResourceExhausted { message }
        } else {
            PipelineError::Model { message }
        }
    }
}

/// Convenience type alias for pairsift results.
pub type Result<T> = std::result::Result<T, PairsiftError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
