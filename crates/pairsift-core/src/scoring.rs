//! Best-match selection between one image and its candidate phrases.
//!
//! Both sides are L2-normalized, so the dot product of the image vector with
//! each text row is the cosine similarity. The highest score wins; ties go to
//! the earliest candidate.

use ndarray::Array2;

use crate::error::PipelineError;
use crate::math::{l2_normalize_in_place, l2_normalize_rows};
use crate::types::MatchResult;

/// Score `candidates` against an image and return the best match.
///
/// `image_embedding` must be a single row; `text_embeddings` must have one
/// row per candidate with the same width.
pub fn score(
    mut image_embedding: Array2<f32>,
    mut text_embeddings: Array2<f32>,
    candidates: &[String],
) -> Result<MatchResult, PipelineError> {
    if candidates.is_empty() || text_embeddings.nrows() == 0 {
        return Err(PipelineError::EmptyCandidates);
    }
    if image_embedding.nrows() != 1 {
        return Err(PipelineError::Model {
            message: format!(
                "Expected one image embedding row, got {}",
                image_embedding.nrows()
            ),
        });
    }
    if text_embeddings.nrows() != candidates.len() {
        return Err(PipelineError::Model {
            message: format!(
                "{} text embeddings for {} candidates",
                text_embeddings.nrows(),
                candidates.len()
            ),
        });
    }
    if image_embedding.ncols() != text_embeddings.ncols() {
        return Err(PipelineError::DimensionMismatch {
            context: "image vs text embeddings".to_string(),
            expected: image_embedding.ncols(),
            actual: text_embeddings.ncols(),
        });
    }

    l2_normalize_in_place(image_embedding.row_mut(0), "image")?;
    l2_normalize_rows(&mut text_embeddings, "text")?;

    let similarities = text_embeddings.dot(&image_embedding.row(0));

    // Strict comparison keeps the first index on ties.
    let mut best = 0;
    for (i, &value) in similarities.iter().enumerate().skip(1) {
        if value > similarities[best] {
            best = i;
        }
    }

    Ok(MatchResult {
        candidate: candidates[best].clone(),
        score: similarities[best].clamp(-1.0, 1.0),
        index: best,
    })
}
