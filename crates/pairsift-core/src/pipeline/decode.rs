//! Image decoding with content-based format detection and a timeout.

use image::{DynamicImage, GenericImageView};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Decodes raw sample bytes under the configured limits.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

impl ImageDecoder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode `bytes` on the blocking pool.
    ///
    /// Fails with `Timeout` (stage "decode") when decoding exceeds
    /// `decode_timeout_ms`, and with `ImageTooLarge` when either side exceeds
    /// `max_image_dimension`.
    pub async fn decode_from_bytes(
        &self,
        bytes: Vec<u8>,
        key: &str,
    ) -> Result<DynamicImage, PipelineError> {
        let key_owned = key.to_string();
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);

        let decode_result = timeout(timeout_duration, async {
            tokio::task::spawn_blocking(move || Self::decode_bytes_sync(bytes, &key_owned)).await
        })
        .await;

        match decode_result {
            Ok(Ok(Ok(image))) => {
                let (width, height) = image.dimensions();
                if width > self.limits.max_image_dimension
                    || height > self.limits.max_image_dimension
                {
                    return Err(PipelineError::ImageTooLarge {
                        key: key.to_string(),
                        width,
                        height,
                        max_dim: self.limits.max_image_dimension,
                    });
                }
                Ok(image)
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(e)) => Err(PipelineError::Decode {
                key: key.to_string(),
                message: format!("Task join error: {}", e),
            }),
            Err(_) => Err(PipelineError::Timeout {
                key: key.to_string(),
                stage: "decode".to_string(),
                timeout_ms: self.limits.decode_timeout_ms,
            }),
        }
    }

    /// Synchronous decode (runs in spawn_blocking).
    fn decode_bytes_sync(bytes: Vec<u8>, key: &str) -> Result<DynamicImage, PipelineError> {
        use std::io::Cursor;

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                key: key.to_string(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        if reader.format().is_none() {
            return Err(PipelineError::Decode {
                key: key.to_string(),
                message: "Unrecognized image format".to_string(),
            });
        }
        reader.decode().map_err(|e| PipelineError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}
