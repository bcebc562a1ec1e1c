//! Core data types for the pairsift scoring pipeline.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::stats::StatsRow;

/// One decoded dataset record, owned by the driver for a single iteration.
pub struct Sample {
    /// Dataset key (file stem shared by the image and its caption)
    pub key: String,

    /// Raw caption text
    pub caption: String,

    /// Decoded image
    pub image: DynamicImage,
}

/// A caption half together with the language detected for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    /// Span text
    pub text: String,

    /// Language code, if detection succeeded
    pub language: Option<String>,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }
}

/// The best-scoring candidate for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Winning candidate phrase
    pub candidate: String,

    /// Cosine similarity between the image and the candidate, in [-1, 1]
    pub score: f32,

    /// Position of the candidate in the scored list
    pub index: usize,
}

/// Final report of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunSummary {
    /// Derived stats table at the end of the run
    pub stats: Vec<StatsRow>,

    /// Rows kept in the sample table
    pub rows_stored: usize,

    /// Samples skipped because of recoverable data errors
    pub skipped: u64,

    /// Throughput over the whole run
    pub samples_per_second: f64,

    /// Wall time of the whole run in seconds
    pub total_seconds: f64,
}
