//! Dataset discovery for extracted webdataset shards.
//!
//! A record is an image file (`<key>.jpg`, `.png`, ...) with a sibling caption
//! file (`<key>.txt`). Keys are paths relative to the dataset root without
//! the extension, so `00000/000001.jpg` has key `00000/000001`.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{DatasetConfig, LimitsConfig};
use crate::error::PipelineError;

/// One discovered (image, caption) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
    pub key: String,
    pub image_path: PathBuf,
    pub caption_path: PathBuf,
}

/// A record read from disk, not yet decoded.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub key: String,
    pub caption: String,
    pub image_bytes: Vec<u8>,
}

impl DatasetEntry {
    /// Read the caption and the image bytes.
    ///
    /// Images over `max_file_size_mb` are rejected before being read.
    pub async fn load(&self, limits: &LimitsConfig) -> Result<RawSample, PipelineError> {
        let unreadable = |what: &str, e: std::io::Error| PipelineError::Sample {
            key: self.key.clone(),
            message: format!("Cannot read {what}: {e}"),
        };

        let metadata = tokio::fs::metadata(&self.image_path)
            .await
            .map_err(|e| unreadable("image", e))?;
        if metadata.len() > limits.max_file_size_bytes() {
            return Err(PipelineError::Sample {
                key: self.key.clone(),
                message: format!(
                    "Image file is {} MB, limit is {} MB",
                    metadata.len() / (1024 * 1024),
                    limits.max_file_size_mb
                ),
            });
        }

        let caption = tokio::fs::read_to_string(&self.caption_path)
            .await
            .map_err(|e| unreadable("caption", e))?;
        let image_bytes = tokio::fs::read(&self.image_path)
            .await
            .map_err(|e| unreadable("image", e))?;

        Ok(RawSample {
            key: self.key.clone(),
            caption,
            image_bytes,
        })
    }
}

/// Sorted list of records found under a dataset root.
#[derive(Debug, Clone, Default)]
pub struct DatasetSource {
    entries: Vec<DatasetEntry>,
    missing_captions: usize,
}

impl DatasetSource {
    /// Walk `root` recursively and pair every image with its caption.
    ///
    /// Images without a caption file are skipped with a warning.
    pub fn discover(root: &Path, config: &DatasetConfig) -> std::io::Result<Self> {
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Dataset directory {:?} does not exist", root),
            ));
        }

        let mut entries = Vec::new();
        let mut missing_captions = 0;

        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !is_image(path, config) {
                continue;
            }

            let caption_path = path.with_extension(&config.caption_extension);
            let Some(key) = record_key(root, path) else {
                continue;
            };
            if !caption_path.is_file() {
                tracing::warn!("Skipping {key}: no .{} caption", config.caption_extension);
                missing_captions += 1;
                continue;
            }

            entries.push(DatasetEntry {
                key,
                image_path: path.to_path_buf(),
                caption_path,
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        tracing::debug!(
            "Discovered {} records under {:?} ({} without captions)",
            entries.len(),
            root,
            missing_captions
        );

        Ok(Self {
            entries,
            missing_captions,
        })
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Images skipped at discovery because their caption file was missing.
    pub fn missing_captions(&self) -> usize {
        self.missing_captions
    }
}

fn is_image(path: &Path, config: &DatasetConfig) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            config
                .image_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn record_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
