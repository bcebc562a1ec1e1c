//! M-CLIP: XLM-Roberta-Large text encoder projected into the CLIP ViT-L/14 space.
//!
//! The exported text tower already includes the mean pooling and linear
//! projection; if it emits raw token states instead, they are mean-pooled
//! over the attention mask.

use std::path::Path;

use image::DynamicImage;
use ndarray::Array2;

use crate::error::PipelineError;

use super::session::{DualEncoder, TextTowerSpec};
use super::{Device, EmbeddingBackend, ModelVariant};

const TEXT_SPEC: TextTowerSpec = TextTowerSpec {
    max_length: 512,
    pad_to_max: false,
    pad_id: 1,
};

pub(crate) struct MultilingualClipBackend {
    encoder: DualEncoder,
}

impl MultilingualClipBackend {
    pub fn load(dir: &Path, device: Device, max_batch_size: usize) -> Result<Self, PipelineError> {
        let dim = ModelVariant::MultilingualClip.embedding_dim();
        let encoder = DualEncoder::load(dir, device, TEXT_SPEC, dim, max_batch_size)?;
        Ok(Self { encoder })
    }
}

impl EmbeddingBackend for MultilingualClipBackend {
    fn name(&self) -> &str {
        "M-CLIP/XLM-Roberta-Large-Vit-L-14"
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
