//! Vision-language embedding backends.
//!
//! Every backend maps images and short texts into one shared space where
//! cosine similarity measures agreement. Backends form a closed set
//! ([`ModelVariant`]) selected by configuration; the pipeline only talks to
//! the [`EmbeddingBackend`] trait.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pairsift_core::embedding::create_backend;
//! use pairsift_core::Config;
//!
//! let config = Config::default();
//! let backend = create_backend(&config)?;
//! let texts = backend.encode_text(&["a red car".to_string()])?;
//! let image = backend.encode_image(&decoded)?;
//! assert_eq!(texts.ncols(), image.ncols());
//! ```

pub mod chunked;
pub(crate) mod multilingual;
pub(crate) mod open_clip;
pub(crate) mod preprocess;
pub(crate) mod sentence;
pub(crate) mod session;

use std::fmt;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use ndarray::Array2;

use crate::config::Config;
use crate::error::{ConfigError, PipelineError};

pub use chunked::encode_chunked;

/// Image tower ONNX model filename.
pub const VISUAL_MODEL_FILENAME: &str = "visual.onnx";

/// Text tower ONNX model filename.
pub const TEXT_MODEL_FILENAME: &str = "text.onnx";

/// Tokenizer filename for the text tower.
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Capabilities shared by every embedding backend.
///
/// Both methods block until results are ready. Returned matrices hold raw
/// (unnormalized) embeddings, one row per input, `embedding_dim()` columns.
pub trait EmbeddingBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Width of every embedding this backend produces.
    fn embedding_dim(&self) -> usize;

    /// Encode candidate phrases. Row `i` corresponds to `candidates[i]`.
    fn encode_text(&self, candidates: &[String]) -> Result<Array2<f32>, PipelineError>;

    /// Encode one image into a single-row matrix.
    fn encode_image(&self, image: &DynamicImage) -> Result<Array2<f32>, PipelineError>;
}

/// Model choices for the open_clip backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenClipModel {
    /// ViT-B-32-quickgelu trained on LAION-400M
    VitB32QuickGelu,
    /// Multilingual xlm-roberta-large text tower with a ViT-H-14 image tower
    XlmRobertaLargeVitH14,
}

impl OpenClipModel {
    /// open_clip model name.
    pub fn name(self) -> &'static str {
        match self {
            OpenClipModel::VitB32QuickGelu => "ViT-B-32-quickgelu",
            OpenClipModel::XlmRobertaLargeVitH14 => "xlm-roberta-large-ViT-H-14",
        }
    }
}

/// The closed set of supported embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// A model from the open_clip family
    OpenClip(OpenClipModel),
    /// M-CLIP XLM-Roberta-Large text encoder paired with CLIP ViT-L/14
    MultilingualClip,
    /// sentence-transformers clip-ViT-B-32 with its multilingual text student
    SentenceTransformers,
}

impl ModelVariant {
    /// Every supported variant.
    pub const ALL: [ModelVariant; 4] = [
        ModelVariant::OpenClip(OpenClipModel::VitB32QuickGelu),
        ModelVariant::OpenClip(OpenClipModel::XlmRobertaLargeVitH14),
        ModelVariant::MultilingualClip,
        ModelVariant::SentenceTransformers,
    ];

    /// Resolve the configured `model_type` / `model_name` pair.
    ///
    /// `model_name` only matters for `open_clip`.
    pub fn parse(model_type: &str, model_name: &str) -> Result<Self, ConfigError> {
        match model_type {
            "open_clip" => match model_name {
                "ViT-B-32-quickgelu" => Ok(Self::OpenClip(OpenClipModel::VitB32QuickGelu)),
                "xlm-roberta-large-ViT-H-14" => {
                    Ok(Self::OpenClip(OpenClipModel::XlmRobertaLargeVitH14))
                }
                other => Err(ConfigError::ValidationError(format!(
                    "Unknown open_clip model '{other}'. \
                     Supported: ViT-B-32-quickgelu, xlm-roberta-large-ViT-H-14"
                ))),
            },
            "xlm_roberta_large_vit_l14" => Ok(Self::MultilingualClip),
            "sentence_transformers" => Ok(Self::SentenceTransformers),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown model type '{other}'. \
                 Supported: open_clip, sentence_transformers, xlm_roberta_large_vit_l14"
            ))),
        }
    }

    /// Embedding width for this variant.
    pub const fn embedding_dim(self) -> usize {
        match self {
            ModelVariant::OpenClip(OpenClipModel::VitB32QuickGelu) => 512,
            ModelVariant::OpenClip(OpenClipModel::XlmRobertaLargeVitH14) => 1024,
            ModelVariant::MultilingualClip => 768,
            ModelVariant::SentenceTransformers => 512,
        }
    }

    /// Directory under the model dir holding this variant's files.
    pub fn dir_name(self) -> &'static str {
        match self {
            ModelVariant::OpenClip(OpenClipModel::VitB32QuickGelu) => "open-clip-vit-b-32-quickgelu",
            ModelVariant::OpenClip(OpenClipModel::XlmRobertaLargeVitH14) => {
                "open-clip-xlm-roberta-large-vit-h-14"
            }
            ModelVariant::MultilingualClip => "mclip-xlm-roberta-large-vit-l-14",
            ModelVariant::SentenceTransformers => "st-clip-vit-b-32-multilingual",
        }
    }

    /// Model directory for this variant.
    pub fn model_dir(self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }

    /// Files this variant needs, relative to its model directory.
    pub fn required_files(self) -> [&'static str; 3] {
        [VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME]
    }

    /// Whether every required file is present under `root`.
    pub fn files_present(self, root: &Path) -> bool {
        let dir = self.model_dir(root);
        self.required_files().iter().all(|f| dir.join(f).exists())
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::OpenClip(model) => write!(f, "open_clip/{}", model.name()),
            ModelVariant::MultilingualClip => write!(f, "xlm_roberta_large_vit_l14"),
            ModelVariant::SentenceTransformers => write!(f, "sentence_transformers"),
        }
    }
}

/// Compute device a backend's sessions are pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(i32),
}

impl Device {
    /// Parse "cpu", "cuda", "cuda:N" or a bare device index "N".
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim().to_lowercase();
        let invalid = || ConfigError::ValidationError(format!("Invalid device '{s}'"));
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            _ => {
                let index = s.strip_prefix("cuda:").unwrap_or(&s);
                let id: i32 = index.parse().map_err(|_| invalid())?;
                if id < 0 {
                    return Err(invalid());
                }
                Ok(Device::Cuda(id))
            }
        }
    }

    /// Fail if this build cannot use the device.
    pub fn ensure_supported(self) -> Result<(), ConfigError> {
        match self {
            Device::Cpu => Ok(()),
            Device::Cuda(_) if cfg!(feature = "cuda") => Ok(()),
            Device::Cuda(id) => Err(ConfigError::ValidationError(format!(
                "Device cuda:{id} requested, but this build lacks the `cuda` feature"
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

/// Construct the backend selected by the configuration.
///
/// Model files are expected under `{model_dir}/{variant dir}/`. Sessions are
/// created once here and pinned to the configured device for the whole run.
pub fn create_backend(config: &Config) -> crate::error::Result<Box<dyn EmbeddingBackend>> {
    let variant = config.model_variant()?;
    let device = config.device()?;
    device.ensure_supported()?;

    let dir = variant.model_dir(&config.model_dir());
    for file in variant.required_files() {
        if !dir.join(file).exists() {
            return Err(ConfigError::ValidationError(format!(
                "Model file {:?} for {} not found. Run `pairsift models list` to see the expected layout.",
                dir.join(file),
                variant
            ))
            .into());
        }
    }

    let max_batch_size = config.embedding.max_batch_size;
    tracing::info!("Loading {} backend on {} from {:?}", variant, device, dir);

    let backend: Box<dyn EmbeddingBackend> = match variant {
        ModelVariant::OpenClip(model) => Box::new(open_clip::OpenClipBackend::load(
            model,
            &dir,
            device,
            max_batch_size,
        )?),
        ModelVariant::MultilingualClip => Box::new(multilingual::MultilingualClipBackend::load(
            &dir,
            device,
            max_batch_size,
        )?),
        ModelVariant::SentenceTransformers => Box::new(sentence::SentenceTransformerBackend::load(
            &dir,
            device,
            max_batch_size,
        )?),
    };

    tracing::info!(
        "{} backend ready ({} dims, max batch {})",
        backend.name(),
        backend.embedding_dim(),
        max_batch_size
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(
            ModelVariant::parse("open_clip", "ViT-B-32-quickgelu").unwrap(),
            ModelVariant::OpenClip(OpenClipModel::VitB32QuickGelu)
        );
        assert_eq!(
            ModelVariant::parse("open_clip", "xlm-roberta-large-ViT-H-14").unwrap(),
            ModelVariant::OpenClip(OpenClipModel::XlmRobertaLargeVitH14)
        );
        assert_eq!(
            ModelVariant::parse("sentence_transformers", "ignored").unwrap(),
            ModelVariant::SentenceTransformers
        );
        assert_eq!(
            ModelVariant::parse("xlm_roberta_large_vit_l14", "").unwrap(),
            ModelVariant::MultilingualClip
        );
    }

    #[test]
    fn test_parse_unknown_variant() {
        assert!(ModelVariant::parse("clap", "").is_err());
        let err = ModelVariant::parse("open_clip", "RN50").unwrap_err();
        assert!(err.to_string().contains("RN50"));
    }

    #[test]
    fn test_embedding_dims() {
        let dims: Vec<usize> = ModelVariant::ALL.iter().map(|v| v.embedding_dim()).collect();
        assert_eq!(dims, vec![512, 1024, 768, 512]);
    }

    #[test]
    fn test_dir_names_are_distinct() {
        let mut names: Vec<&str> = ModelVariant::ALL.iter().map(|v| v.dir_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ModelVariant::ALL.len());
    }

    #[test]
    fn test_files_present() {
        let dir = tempfile::tempdir().unwrap();
        let variant = ModelVariant::SentenceTransformers;
        assert!(!variant.files_present(dir.path()));

        let model_dir = variant.model_dir(dir.path());
        std::fs::create_dir_all(&model_dir).unwrap();
        for file in variant.required_files() {
            std::fs::write(model_dir.join(file), b"").unwrap();
        }
        assert!(variant.files_present(dir.path()));
    }

    #[test]
    fn test_device_parse() {
        assert_eq!(Device::parse("cpu").unwrap(), Device::Cpu);
        assert_eq!(Device::parse("CUDA").unwrap(), Device::Cuda(0));
        assert_eq!(Device::parse("cuda:2").unwrap(), Device::Cuda(2));
        assert_eq!(Device::parse("1").unwrap(), Device::Cuda(1));
        assert!(Device::parse("cuda:-1").is_err());
        assert!(Device::parse("tpu").is_err());
    }

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Cuda(3).to_string(), "cuda:3");
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }

    #[test]
    fn test_cpu_always_supported() {
        assert!(Device::Cpu.ensure_supported().is_ok());
    }

    #[test]
    fn test_create_backend_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.model_dir = dir.path().to_path_buf();
        let err = create_backend(&config).err().unwrap();
        assert!(err.to_string().contains("not found"));
    }
}
