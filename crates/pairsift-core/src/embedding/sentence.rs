//! sentence-transformers clip-ViT-B-32 with the multilingual text student.
//!
//! Text goes through the distilled multilingual encoder, images through the
//! original CLIP image tower; both land in the same 512-d space.

use std::path::Path;

use image::DynamicImage;
use ndarray::Array2;

use crate::error::PipelineError;

use super::session::{DualEncoder, TextTowerSpec};
use super::{Device, EmbeddingBackend, ModelVariant};

const TEXT_SPEC: TextTowerSpec = TextTowerSpec {
    max_length: 128,
    pad_to_max: false,
    pad_id: 0,
};

pub(crate) struct SentenceTransformerBackend {
    encoder: DualEncoder,
}

impl SentenceTransformerBackend {
    pub fn load(dir: &Path, device: Device, max_batch_size: usize) -> Result<Self, PipelineError> {
        let dim = ModelVariant::SentenceTransformers.embedding_dim();
        let encoder = DualEncoder::load(dir, device, TEXT_SPEC, dim, max_batch_size)?;
        Ok(Self { encoder })
    }
}

impl EmbeddingBackend for SentenceTransformerBackend {
    fn name(&self) -> &str {
        "sentence-transformers/clip-ViT-B-32-multilingual-v1"
    }

    fn embedding_dim(&self) -> usize {
        self.encoder.embedding_dim()
    }

    fn encode_text(&self, candidates: &[String]) -> Result<Array2<f32>, PipelineError> {
        self.encoder.encode_text(candidates)
    }

    fn encode_image(&self, image: &DynamicImage) -> Result<Array2<f32>, PipelineError> {
        self.encoder.encode_image(image)
    }
}
