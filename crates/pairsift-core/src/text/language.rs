//! Language identification oracle.
//!
//! The pipeline treats language identification as a black box: given a piece
//! of text it either returns a language code or nothing.

/// Result of a successful language detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Language code (e.g., "en", "de")
    pub language: String,

    /// Detector confidence in [0, 1]
    pub probability: f32,
}

/// Anything that can guess the language of a piece of text.
pub trait LanguageDetector: Send + Sync {
    /// Detect the language of `text`, or `None` if it cannot be determined.
    fn detect(&self, text: &str) -> Option<Detection>;
}

/// Detector that reports one fixed language for every non-blank input.
///
/// Useful for monolingual datasets where running an identification model
/// would only add noise.
#[derive(Debug, Clone)]
pub struct AssumedLanguage {
    language: String,
}

impl AssumedLanguage {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

impl LanguageDetector for AssumedLanguage {
    fn detect(&self, text: &str) -> Option<Detection> {
        if text.trim().is_empty() {
            return None;
        }
        Some(Detection {
            language: self.language.clone(),
            probability: 1.0,
        })
    }
}
