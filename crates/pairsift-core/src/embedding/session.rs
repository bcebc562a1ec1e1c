//! ONNX Runtime session management for image and text towers.
//!
//! Both towers wrap a `Session` in a `Mutex` because `Session::run` requires
//! `&mut self`. Sessions are created once, pinned to the configured device.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array2;
use ort::session::Session;
use ort::value::Value;
use tokenizers::Tokenizer;

use crate::error::PipelineError;

use super::preprocess::preprocess;
use super::Device;

/// Image tower output names tried, in order, before falling back to the first output.
const IMAGE_OUTPUTS: [&str; 3] = ["image_embeds", "embeddings", "pooler_output"];

/// Text tower output names tried, in order, before falling back to the first output.
const TEXT_OUTPUTS: [&str; 4] = [
    "text_embeds",
    "sentence_embedding",
    "embeddings",
    "pooler_output",
];

/// Create a session for `model_path` on `device`.
pub(crate) fn load_session(model_path: &Path, device: Device) -> Result<Session, PipelineError> {
    let builder = Session::builder().map_err(|e| PipelineError::Model {
        message: format!("Failed to create ONNX session builder: {e}"),
    })?;

    let builder = match device {
        Device::Cpu => builder,
        Device::Cuda(id) => with_cuda(builder, id)?,
    };

    builder
        .commit_from_file(model_path)
        .map_err(|e| PipelineError::Model {
            message: format!("Failed to load ONNX model {:?}: {e}", model_path),
        })
}

#[cfg(feature = "cuda")]
fn with_cuda(
    builder: ort::session::builder::SessionBuilder,
    id: i32,
) -> Result<ort::session::builder::SessionBuilder, PipelineError> {
    use ort::execution_providers::CUDAExecutionProvider;

    builder
        .with_execution_providers([CUDAExecutionProvider::default()
            .with_device_id(id)
            .build()])
        .map_err(|e| PipelineError::Model {
            message: format!("Failed to register CUDA device {id}: {e}"),
        })
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(
    _builder: ort::session::builder::SessionBuilder,
    id: i32,
) -> Result<ort::session::builder::SessionBuilder, PipelineError> {
    Err(PipelineError::Model {
        message: format!("CUDA device {id} requested without the `cuda` feature"),
    })
}

/// First name in `preferred` the model exposes, else the model's first output.
fn select_output<'a>(names: &[&'a str], preferred: &[&str]) -> Option<&'a str> {
    preferred
        .iter()
        .find_map(|wanted| names.iter().find(|name| **name == *wanted).copied())
        .or_else(|| names.first().copied())
}

/// The token-id input: the first input that is not the attention mask.
fn text_input_name(names: &[&str]) -> String {
    names
        .iter()
        .find(|name| **name != "attention_mask")
        .map(|name| name.to_string())
        .unwrap_or_else(|| "input_ids".to_string())
}

/// Pull the embedding tensor out of a session's outputs.
///
/// Returns the shape (as usize) and a copy of the flat data.
fn extract_embedding_output(
    outputs: &ort::session::SessionOutputs,
    preferred: &[&str],
    context: &str,
) -> Result<(Vec<usize>, Vec<f32>), PipelineError> {
    let names: Vec<&str> = outputs.iter().map(|(name, _)| name).collect();
    let no_outputs = || PipelineError::Model {
        message: format!("{context} tower produced no outputs"),
    };
    let wanted = select_output(&names, preferred).ok_or_else(no_outputs)?;
    let value = outputs
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, value)| value)
        .ok_or_else(no_outputs)?;

    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| PipelineError::Model {
            message: format!("Failed to extract {context} output tensor: {e}"),
        })?;

    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    Ok((dims, data.to_vec()))
}

/// Image tower: preprocessed image in, one embedding row out.
pub(crate) struct VisionSession {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
    image_size: u32,
    embedding_dim: usize,
}

impl VisionSession {
    pub fn load(
        model_path: &Path,
        device: Device,
        image_size: u32,
        embedding_dim: usize,
    ) -> Result<Self, PipelineError> {
        let session = load_session(model_path, device)?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!(
            "Loaded image tower from {:?} (input: {:?}, outputs: {:?})",
            model_path,
            input_name,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            image_size,
            embedding_dim,
        })
    }

    /// Encode one image into a `[1, embedding_dim]` matrix.
    pub fn encode(&self, image: &image::DynamicImage) -> Result<Array2<f32>, PipelineError> {
        let tensor = preprocess(image, self.image_size);
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = tensor.iter().copied().collect();

        let input_value =
            Value::from_array((shape, flat_data)).map_err(|e| PipelineError::Model {
                message: format!("Failed to create image input tensor: {e}"),
            })?;

        let mut session = self.session.lock().map_err(|e| PipelineError::Model {
            message: format!("Image tower lock poisoned: {e}"),
        })?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| PipelineError::from_inference("image tower inference", e))?;

        let (dims, data) = extract_embedding_output(&outputs, &IMAGE_OUTPUTS, "image")?;
        let width = match dims.as_slice() {
            [dim] | [1, dim] => *dim,
            _ => {
                return Err(PipelineError::Model {
                    message: format!("Unexpected image embedding shape: {:?}", dims),
                })
            }
        };
        if width != self.embedding_dim {
            return Err(PipelineError::DimensionMismatch {
                context: "image tower output".to_string(),
                expected: self.embedding_dim,
                actual: width,
            });
        }

        Array2::from_shape_vec((1, width), data).map_err(|e| PipelineError::Model {
            message: format!("Image embedding reshape failed: {e}"),
        })
    }
}

/// How a text tower's token ids are laid out.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextTowerSpec {
    /// Maximum sequence length; longer inputs are truncated
    pub max_length: usize,
    /// Pad every sequence to `max_length` (CLIP) rather than to the longest in the batch
    pub pad_to_max: bool,
    /// Fallback pad id when the tokenizer does not declare one
    pub pad_id: u32,
}

/// Text tower: a batch of strings in, one embedding row per string out.
///
/// Handles towers that emit pooled `[batch, dim]` embeddings as well as
/// towers that emit `[batch, seq, dim]` token states, which are mean-pooled
/// over the attention mask.
pub(crate) struct TextSession {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    spec: TextTowerSpec,
    /// Name of the token-id input (detected from model metadata).
    input_name: String,
    wants_attention_mask: bool,
    embedding_dim: usize,
    /// Largest batch the tower accepts in one run.
    ceiling: usize,
}

impl TextSession {
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        device: Device,
        spec: TextTowerSpec,
        embedding_dim: usize,
        ceiling: usize,
    ) -> Result<Self, PipelineError> {
        let session = load_session(model_path, device)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| PipelineError::Model {
            message: format!("Failed to load tokenizer {:?}: {e}", tokenizer_path),
        })?;

        let input_names: Vec<&str> = session.inputs().iter().map(|i| i.name()).collect();
        let input_name = text_input_name(&input_names);
        let wants_attention_mask = input_names.contains(&"attention_mask");

        tracing::debug!(
            "Loaded text tower from {:?} (inputs: {:?}, outputs: {:?})",
            model_path,
            input_names,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            spec,
            input_name,
            wants_attention_mask,
            embedding_dim,
            ceiling,
        })
    }

    /// Encode one batch. Batches above the ceiling are refused outright.
    pub fn encode(&self, texts: &[String]) -> Result<Array2<f32>, PipelineError> {
        let batch_size = texts.len();
        if batch_size > self.ceiling {
            return Err(PipelineError::ResourceExhausted {
                message: format!(
                    "text batch of {batch_size} exceeds the inference ceiling of {}",
                    self.ceiling
                ),
            });
        }
        if batch_size == 0 {
            return Ok(Array2::zeros((0, self.embedding_dim)));
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| PipelineError::Model {
                message: format!("Tokenization failed: {e}"),
            })?;

        let longest = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.spec.max_length))
            .max()
            .unwrap_or(1)
            .max(1);
        let seq_len = if self.spec.pad_to_max {
            self.spec.max_length
        } else {
            longest
        };
        let pad_id = self
            .tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .unwrap_or(self.spec.pad_id) as i64;

        let mut input_ids = vec![pad_id; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        for (i, encoding) in encodings.iter().enumerate() {
            for (j, &id) in encoding.get_ids().iter().take(seq_len).enumerate() {
                input_ids[i * seq_len + j] = id as i64;
                attention_mask[i * seq_len + j] = 1;
            }
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let ids_value =
            Value::from_array((shape.clone(), input_ids)).map_err(|e| PipelineError::Model {
                message: format!("Failed to create {} tensor: {e}", self.input_name),
            })?;

        let mut session = self.session.lock().map_err(|e| PipelineError::Model {
            message: format!("Text tower lock poisoned: {e}"),
        })?;

        let outputs = if self.wants_attention_mask {
            let mask_value = Value::from_array((shape, attention_mask.clone())).map_err(|e| {
                PipelineError::Model {
                    message: format!("Failed to create attention_mask tensor: {e}"),
                }
            })?;
            session.run(ort::inputs![
                self.input_name.as_str() => ids_value,
                "attention_mask" => mask_value
            ])
        } else {
            session.run(ort::inputs![self.input_name.as_str() => ids_value])
        }
        .map_err(|e| PipelineError::from_inference("text tower inference", e))?;

        let (dims, data) = extract_embedding_output(&outputs, &TEXT_OUTPUTS, "text")?;
        let embeddings = match dims.as_slice() {
            [b, d] if *b == batch_size => Array2::from_shape_vec((*b, *d), data).map_err(|e| {
                PipelineError::Model {
                    message: format!("Text embedding reshape failed: {e}"),
                }
            })?,
            [b, s, d] if *b == batch_size && *s == seq_len => {
                mean_pool(&data, &attention_mask, *b, *s, *d)
            }
            _ => {
                return Err(PipelineError::Model {
                    message: format!(
                        "Unexpected text embedding shape {:?} for batch of {}",
                        dims, batch_size
                    ),
                })
            }
        };

        if embeddings.ncols() != self.embedding_dim {
            return Err(PipelineError::DimensionMismatch {
                context: "text tower output".to_string(),
                expected: self.embedding_dim,
                actual: embeddings.ncols(),
            });
        }
        Ok(embeddings)
    }
}

/// An image tower and a text tower sharing one embedding space.
pub(crate) struct DualEncoder {
    image: VisionSession,
    text: TextSession,
    embedding_dim: usize,
    max_batch_size: usize,
}

impl DualEncoder {
    /// Load `visual.onnx`, `text.onnx` and `tokenizer.json` from `dir`.
    pub fn load(
        dir: &Path,
        device: Device,
        text_spec: TextTowerSpec,
        embedding_dim: usize,
        max_batch_size: usize,
    ) -> Result<Self, PipelineError> {
        let image = VisionSession::load(
            &dir.join(super::VISUAL_MODEL_FILENAME),
            device,
            super::preprocess::IMAGE_SIZE,
            embedding_dim,
        )?;
        let text = TextSession::load(
            &dir.join(super::TEXT_MODEL_FILENAME),
            &dir.join(super::TOKENIZER_FILENAME),
            device,
            text_spec,
            embedding_dim,
            max_batch_size,
        )?;
        Ok(Self {
            image,
            text,
            embedding_dim,
            max_batch_size,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn encode_text(&self, texts: &[String]) -> Result<Array2<f32>, PipelineError> {
        super::chunked::encode_chunked(texts, self.max_batch_size, self.embedding_dim, |chunk| {
            self.text.encode(chunk)
        })
    }

    pub fn encode_image(&self, image: &image::DynamicImage) -> Result<Array2<f32>, PipelineError> {
        self.image.encode(image)
    }
}

/// Average token states over positions where the attention mask is set.
fn mean_pool(data: &[f32], mask: &[i64], batch: usize, seq: usize, dim: usize) -> Array2<f32> {
    let mut pooled = Array2::<f32>::zeros((batch, dim));
    for b in 0..batch {
        let mut count = 0.0f32;
        for s in 0..seq {
            if mask[b * seq + s] == 0 {
                continue;
            }
            count += 1.0;
            let offset = (b * seq + s) * dim;
            for d in 0..dim {
                pooled[[b, d]] += data[offset + d];
            }
        }
        if count > 0.0 {
            pooled.row_mut(b).mapv_inplace(|x| x / count);
        }
    }
    pooled
}
