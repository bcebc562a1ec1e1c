//! N-gram candidate generation with language and perplexity filtering.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{CandidateConfig, NgramRange};
use crate::error::ConfigError;

use super::language::LanguageDetector;
use super::perplexity::PerplexityScorer;

/// Every window of `n` consecutive tokens, joined with single spaces.
///
/// Yields `max(0, tokens.len() - n + 1)` phrases; `n == 0` yields nothing.
pub fn raw_ngrams<'a>(tokens: &'a [&'a str], n: usize) -> impl Iterator<Item = String> + 'a {
    let windows = if n == 0 { &[][..] } else { tokens };
    windows.windows(n.max(1)).map(|w| w.join(" "))
}

/// All n-grams of `text` for every length in `range`, shortest first,
/// with duplicates removed (first occurrence wins).
pub fn unique_ngrams(text: &str, range: NgramRange) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < range.min {
        return vec![];
    }

    let mut seen = HashSet::new();
    let mut phrases = Vec::new();
    for n in range.lengths() {
        for phrase in raw_ngrams(&tokens, n) {
            if seen.insert(phrase.clone()) {
                phrases.push(phrase);
            }
        }
    }
    phrases
}

/// Produces filtered candidate phrases for one caption span.
pub struct CandidateGenerator {
    range: NgramRange,
    filter_by_language: bool,
    detector: Arc<dyn LanguageDetector>,
    perplexity: Option<Arc<dyn PerplexityScorer>>,
    perplexity_threshold: f64,
}

impl CandidateGenerator {
    /// Create a generator. Fails if the n-gram range is invalid.
    pub fn new(
        range: NgramRange,
        filter_by_language: bool,
        detector: Arc<dyn LanguageDetector>,
        perplexity: Option<Arc<dyn PerplexityScorer>>,
        perplexity_threshold: f64,
    ) -> Result<Self, ConfigError> {
        range.check()?;
        Ok(Self {
            range,
            filter_by_language,
            detector,
            perplexity,
            perplexity_threshold,
        })
    }

    /// Create a generator from the `[candidates]` config section.
    pub fn from_config(
        config: &CandidateConfig,
        detector: Arc<dyn LanguageDetector>,
        perplexity: Option<Arc<dyn PerplexityScorer>>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            config.ngram_range,
            config.filter_by_language,
            detector,
            perplexity,
            config.perplexity_threshold,
        )
    }

    /// The configured n-gram range.
    pub fn range(&self) -> NgramRange {
        self.range
    }

    /// Generate the candidates of one span whose language is `language`.
    ///
    /// Phrases that fail the language check (when enabled) or whose
    /// perplexity is above the threshold (when a scorer is present) are
    /// dropped. Order is shortest n first, then left to right.
    pub fn generate(&self, text: &str, language: &str) -> Vec<String> {
        let phrases = unique_ngrams(text, self.range);
        let raw = phrases.len();

        let kept: Vec<String> = phrases
            .into_iter()
            .filter(|phrase| !self.filter_by_language || self.language_matches(phrase, language))
            .filter(|phrase| self.perplexity_ok(phrase, language))
            .collect();

        tracing::trace!(
            "Candidates: {} of {} n-grams kept (lang={})",
            kept.len(),
            raw,
            language
        );
        kept
    }

    fn language_matches(&self, phrase: &str, language: &str) -> bool {
        self.detector
            .detect(phrase)
            .is_some_and(|d| d.language == language)
    }

    fn perplexity_ok(&self, phrase: &str, language: &str) -> bool {
        match &self.perplexity {
            Some(scorer) => scorer.perplexity(phrase, language) <= self.perplexity_threshold,
            None => true,
        }
    }
}
