//! Caption text processing: segmentation, language and perplexity oracles,
//! and n-gram candidate generation.

pub mod language;
pub mod ngrams;
pub mod perplexity;
pub mod segment;

pub use language::{AssumedLanguage, Detection, LanguageDetector};
pub use ngrams::{raw_ngrams, unique_ngrams, CandidateGenerator};
pub use perplexity::{PerplexityScorer, UnigramModel};
pub use segment::{segment, DEFAULT_SPLIT_MARKER};
