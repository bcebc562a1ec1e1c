//! Small WebP previews of accepted images for the prediction table.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

/// An encoded preview image carried in the prediction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Encoding of `data`; always "webp"
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Base64-encoded image bytes
    pub data: String,
}

/// Generates previews with the longest edge capped at `size`.
#[derive(Debug, Clone, Copy)]
pub struct PreviewGenerator {
    size: u32,
}

impl PreviewGenerator {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Encode a preview, or `None` if WebP encoding fails.
    pub fn generate(&self, image: &DynamicImage) -> Option<ImagePayload> {
        let preview = image.thumbnail(self.size, self.size);

        let mut buffer = Cursor::new(Vec::new());
        if let Err(e) = preview.write_to(&mut buffer, ImageFormat::WebP) {
            tracing::debug!("Preview encoding failed: {e}");
            return None;
        }

        Some(ImagePayload {
            format: "webp".to_string(),
            width: preview.width(),
            height: preview.height(),
            data: BASE64.encode(buffer.into_inner()),
        })
    }
}
