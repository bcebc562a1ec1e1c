//! Scoring pipeline stages.
//!
//! - **decode**: bytes to bitmap under size and time limits
//! - **driver**: the per-sample loop tying segmentation, candidate
//!   generation, embedding, scoring and aggregation together

pub mod decode;
pub mod driver;

pub use decode::ImageDecoder;
pub use driver::Pipeline;
