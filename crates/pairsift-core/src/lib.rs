//! pairsift core - scoring image-caption pairs with vision-language embeddings.
//!
//! For every (image, caption) pair the pipeline extracts candidate phrases
//! from the caption, embeds them together with the image, and keeps the
//! phrase the image agrees with most. Running statistics and a capped table
//! of accepted pairs are flushed to a report sink as the run progresses.
//!
//! # Architecture
//!
//! ```text
//! Record → Decode → Segment → Detect language → N-grams → Embed → Score → Aggregate → Flush
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use pairsift_core::{Config, DatasetSource, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> pairsift_core::Result<()> {
//!     let config = Config::load()?;
//!     let source = DatasetSource::discover("./shard-00000".as_ref(), &config.dataset)?;
//!     let mut pipeline = Pipeline::from_config(config)?;
//!
//!     let summary = pipeline.run(&source).await?;
//!     println!("{} rows stored", summary.rows_stored);
//!     Ok(())
//! }
//! ```

// Accelerate-backed BLAS for ndarray dot products on macOS
#[cfg(target_os = "macos")]
extern crate blas_src;

pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod stats;
pub mod text;
pub mod types;

pub use config::Config;
pub use dataset::{DatasetEntry, DatasetSource};
pub use embedding::{create_backend, Device, EmbeddingBackend, ModelVariant, OpenClipModel};
pub use error::{ConfigError, PairsiftError, PipelineError, PipelineResult, Result};
pub use pipeline::Pipeline;
pub use report::{JsonReportSink, NoopSink, ReportSink};
pub use stats::{RunningStats, StatsRow};
pub use types::{MatchResult, RunSummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
