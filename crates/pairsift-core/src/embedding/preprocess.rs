//! Image preprocessing for CLIP-style image towers.
//!
//! All supported image towers expect:
//! - Shortest side resized to 224, then a centered 224×224 crop
//! - Bicubic resampling
//! - Per-channel normalization with the OpenAI CLIP mean/std
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Input resolution shared by every supported image tower.
pub const IMAGE_SIZE: u32 = 224;

/// CLIP normalization mean (per-channel, RGB).
const NORM_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per-channel, RGB).
const NORM_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Preprocess an image for a CLIP image tower.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let (width, height) = (image.width().max(1), image.height().max(1));

    // Scale so the shortest side equals image_size, keeping aspect ratio.
    let scale = image_size as f32 / width.min(height) as f32;
    let new_w = ((width as f32 * scale).round() as u32).max(image_size);
    let new_h = ((height as f32 * scale).round() as u32).max(image_size);
    let resized = image.resize_exact(new_w, new_h, FilterType::CatmullRom);

    let left = (new_w - image_size) / 2;
    let top = (new_h - image_size) / 2;
    let cropped = resized.crop_imm(left, top, image_size, image_size);
    let rgb = cropped.to_rgb8();

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..CHANNELS {
            let val = pixel.0[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (val - NORM_MEAN[c]) / NORM_STD[c];
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn test_preprocess_shape_landscape() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let tensor = preprocess(&img, IMAGE_SIZE);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_shape_tiny_portrait() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(3, 17));
        let tensor = preprocess(&img, IMAGE_SIZE);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_normalization() {
        // White -> (1 - mean) / std per channel
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([255, 255, 255])));
        let tensor = preprocess(&img, IMAGE_SIZE);
        for c in 0..3 {
            let expected = (1.0 - NORM_MEAN[c]) / NORM_STD[c];
            assert!((tensor[[0, c, 100, 100]] - expected).abs() < 0.01);
        }

        // Black -> -mean / std per channel
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([0, 0, 0])));
        let tensor = preprocess(&img, IMAGE_SIZE);
        let expected = -NORM_MEAN[0] / NORM_STD[0];
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_center_crop() {
        // Left half red, right half blue; a wide image keeps only the middle,
        // so both colors must survive the crop.
        let mut img = RgbImage::new(448, 224);
        for (x, _, p) in img.enumerate_pixels_mut() {
            *p = if x < 224 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) };
        }
        let tensor = preprocess(&DynamicImage::ImageRgb8(img), IMAGE_SIZE);
        assert!(tensor[[0, 0, 112, 10]] > tensor[[0, 2, 112, 10]]);
        assert!(tensor[[0, 2, 112, 213]] > tensor[[0, 0, 112, 213]]);
    }
}
