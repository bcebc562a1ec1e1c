//! open_clip family backends.

use std::path::Path;

use image::DynamicImage;
use ndarray::Array2;

use crate::error::PipelineError;

use super::session::{DualEncoder, TextTowerSpec};
use super::{Device, EmbeddingBackend, ModelVariant, OpenClipModel};

/// CLIP context length.
const CONTEXT_LENGTH: usize = 77;

pub(crate) struct OpenClipBackend {
    model: OpenClipModel,
    encoder: DualEncoder,
}

impl OpenClipBackend {
    pub fn load(
        model: OpenClipModel,
        dir: &Path,
        device: Device,
        max_batch_size: usize,
    ) -> Result<Self, PipelineError> {
        let spec = text_spec(model);
        let dim = ModelVariant::OpenClip(model).embedding_dim();
        let encoder = DualEncoder::load(dir, device, spec, dim, max_batch_size)?;
        Ok(Self { model, encoder })
    }
}

/// Token layout per text tower. Both pad to the full context length;
/// the BPE tower pads with 0, the XLM-Roberta tower with its `<pad>` id 1.
fn text_spec(model: OpenClipModel) -> TextTowerSpec {
    match model {
        OpenClipModel::VitB32QuickGelu => TextTowerSpec {
            max_length: CONTEXT_LENGTH,
            pad_to_max: true,
            pad_id: 0,
        },
        OpenClipModel::XlmRobertaLargeVitH14 => TextTowerSpec {
            max_length: CONTEXT_LENGTH,
            pad_to_max: true,
            pad_id: 1,
        },
    }
}

impl EmbeddingBackend for OpenClipBackend {
    fn name(&self) -> &str {
        self.model.name()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_specs_use_full_context() {
        for model in [
            OpenClipModel::VitB32QuickGelu,
            OpenClipModel::XlmRobertaLargeVitH14,
        ] {
            let spec = text_spec(model);
            assert_eq!(spec.max_length, 77);
            assert!(spec.pad_to_max);
        }
        assert_eq!(text_spec(OpenClipModel::XlmRobertaLargeVitH14).pad_id, 1);
    }

    #[test]
    fn test_load_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = OpenClipBackend::load(
            OpenClipModel::VitB32QuickGelu,
            dir.path(),
            Device::Cpu,
            16,
        );
        assert!(matches!(result, Err(PipelineError::Model { .. })));
    }
}
