//! Perplexity scoring oracle and a unigram language model implementation.
//!
//! Candidate phrases that read like noise (URLs, SKU fragments, keyword
//! soup) tend to have high perplexity under a language model trained on
//! natural captions. The pipeline only sees the [`PerplexityScorer`] trait;
//! [`UnigramModel`] is the bundled implementation, loaded once per run.

use std::collections::HashMap;
use std::path::Path;

use crate::error::PipelineError;

/// Anything that can assign a perplexity to a phrase.
pub trait PerplexityScorer: Send + Sync {
    /// Perplexity of `phrase` in `language`. Lower is more natural.
    fn perplexity(&self, phrase: &str, language: &str) -> f64;
}

/// Add-one smoothed unigram model read from a `word<TAB>count` file.
pub struct UnigramModel {
    name: String,
    counts: HashMap<String, u64>,
    total: u64,
}

impl UnigramModel {
    /// Load a unigram model from disk.
    ///
    /// Lines starting with `#` and blank lines are ignored. Words are
    /// lowercased; repeated words have their counts summed.
    pub fn load(name: &str, path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::LanguageModel {
                message: format!("Language model '{name}' not found at {:?}", path),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::LanguageModel {
            message: format!("Failed to read {:?}: {}", path, e),
        })?;
        let model = Self::parse(name, &content)?;

        tracing::info!(
            "Loaded language model '{}': {} words, {} tokens",
            name,
            model.counts.len(),
            model.total
        );
        Ok(model)
    }

    /// Build a model from the text of a counts file.
    pub fn parse(name: &str, content: &str) -> Result<Self, PipelineError> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let (word, count) = line.split_once('\t').ok_or_else(|| PipelineError::LanguageModel {
                message: format!("{name}:{}: expected word<TAB>count", line_no + 1),
            })?;
            let count: u64 = count
                .trim()
                .parse()
                .map_err(|e| PipelineError::LanguageModel {
                    message: format!("{name}:{}: bad count: {e}", line_no + 1),
                })?;
            *counts.entry(word.trim().to_lowercase()).or_insert(0) += count;
        }

        let total = counts.values().sum();
        Ok(Self {
            name: name.to_string(),
            counts,
            total,
        })
    }

    /// Model name as configured.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Smoothed log-probability of a single word.
    fn log_prob(&self, word: &str) -> f64 {
        // One extra slot in the denominator for the unknown word.
        let vocab = self.counts.len() as f64 + 1.0;
        let count = self.counts.get(word).copied().unwrap_or(0) as f64;
        ((count + 1.0) / (self.total as f64 + vocab)).ln()
    }
}

impl PerplexityScorer for UnigramModel {
    fn perplexity(&self, phrase: &str, _language: &str) -> f64 {
        let words: Vec<String> = phrase.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return f64::INFINITY;
        }
        let log_sum: f64 = words.iter().map(|w| self.log_prob(w)).sum();
        (-log_sum / words.len() as f64).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTS: &str = "# word\tcount\nthe\t500\ncar\t40\nred\t30\ndriving\t10\n";

    #[test]
    fn test_parse_counts() {
        let model = UnigramModel::parse("test", COUNTS).unwrap();
        assert_eq!(model.name(), "test");
        assert_eq!(model.total, 580);
        assert_eq!(model.counts.get("car"), Some(&40));
    }

    #[test]
    fn test_common_words_score_lower_than_unknown() {
        let model = UnigramModel::parse("test", COUNTS).unwrap();
        let natural = model.perplexity("the red car", "en");
        let noise = model.perplexity("xj9 qq7 zz", "en");
        assert!(natural < noise);
    }

    #[test]
    fn test_perplexity_is_case_insensitive() {
        let model = UnigramModel::parse("test", COUNTS).unwrap();
        let lower = model.perplexity("red car", "en");
        let upper = model.perplexity("RED Car", "en");
        assert!((lower - upper).abs() < 1e-9);
    }

    #[test]
    fn test_empty_phrase_is_infinite() {
        let model = UnigramModel::parse("test", COUNTS).unwrap();
        assert!(model.perplexity("   ", "en").is_infinite());
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        let err = UnigramModel::parse("bad", "car 40\n").err().unwrap();
        assert!(err.to_string().contains("bad:1"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = UnigramModel::load("laion2B-en", &dir.path().join("missing.tsv"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("laion2B-en"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.tsv");
        std::fs::write(&path, COUNTS).unwrap();
        let model = UnigramModel::load("tiny", &path).unwrap();
        assert!(model.perplexity("the car", "en").is_finite());
    }
}
