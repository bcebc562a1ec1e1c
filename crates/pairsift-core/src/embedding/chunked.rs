//! Chunked text encoding under a hard batch-size ceiling.
//!
//! The underlying inference call refuses batches above `max_batch_size`.
//! Larger candidate lists are split into contiguous chunks, and each chunk's
//! output is written into its row range of one preallocated matrix, so the
//! result is identical in order to a single unchunked call.

use ndarray::{s, Array2};

use crate::error::PipelineError;

/// Encode `texts` in chunks of at most `max_batch_size`.
///
/// `encode_chunk` is called once per chunk, in order, and must return one
/// row per input text with `embedding_dim` columns.
pub fn encode_chunked<F>(
    texts: &[String],
    max_batch_size: usize,
    embedding_dim: usize,
    mut encode_chunk: F,
) -> Result<Array2<f32>, PipelineError>
where
    F: FnMut(&[String]) -> Result<Array2<f32>, PipelineError>,
{
    if max_batch_size == 0 {
        return Err(PipelineError::ResourceExhausted {
            message: "max_batch_size is 0; no batch can be submitted".to_string(),
        });
    }

    if texts.len() <= max_batch_size {
        let encoded = encode_chunk(texts)?;
        check_chunk(&encoded, texts.len(), embedding_dim)?;
        return Ok(encoded);
    }

    let mut output = Array2::<f32>::zeros((texts.len(), embedding_dim));
    let chunks = texts.len().div_ceil(max_batch_size);
    tracing::debug!(
        "Encoding {} texts in {} chunks of <= {}",
        texts.len(),
        chunks,
        max_batch_size
    );

    for (i, chunk) in texts.chunks(max_batch_size).enumerate() {
        let start = i * max_batch_size;
        let encoded = encode_chunk(chunk)?;
        check_chunk(&encoded, chunk.len(), embedding_dim)?;
        output
            .slice_mut(s![start..start + chunk.len(), ..])
            .assign(&encoded);
    }

    Ok(output)
}

fn check_chunk(encoded: &Array2<f32>, rows: usize, embedding_dim: usize) -> Result<(), PipelineError> {
    if encoded.ncols() != embedding_dim {
        return Err(PipelineError::DimensionMismatch {
            context: "text encoder output".to_string(),
            expected: embedding_dim,
            actual: encoded.ncols(),
        });
    }
    if encoded.nrows() != rows {
        return Err(PipelineError::Model {
            message: format!(
                "Text encoder returned {} rows for {} inputs",
                encoded.nrows(),
                rows
            ),
        });
    }
    Ok(())
}
