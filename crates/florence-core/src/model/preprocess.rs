//! Image preprocessing for the Florence-2 vision encoder.
//!
//! Florence-2 expects:
//! - Input size: 768×768 pixels, bicubic resize ignoring aspect ratio
//! - Normalization: ImageNet mean/std after scaling to [0, 1]
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

use crate::error::{CaptionError, CaptionResult};

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Default square input size for Florence-2 base and large.
pub const DEFAULT_IMAGE_SIZE: u32 = 768;

/// ImageNet per-channel mean.
const NORM_MEAN: [f32; CHANNELS] = [0.485, 0.456, 0.406];

/// ImageNet per-channel std.
const NORM_STD: [f32; CHANNELS] = [0.229, 0.224, 0.225];

/// Resize and normalize an image into a `[1, 3, size, size]` tensor.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> CaptionResult<Array4<f32>> {
    if image_size == 0 {
        return Err(CaptionError::Preprocess {
            message: "image size must be > 0".to_string(),
        });
    }

    let resized = image.resize_exact(
        image_size,
        image_size,
        image::imageops::FilterType::CatmullRom,
    );
    let rgb = resized.to_rgb8();

    let size = image_size as usize;
    let plane = size * size;
    let mut data = vec![0f32; CHANNELS * plane];

    // Planar layout: offset = c * plane + y * size + x, and pixels arrive row-major.
    for (i, pixel) in rgb.as_raw().chunks_exact(CHANNELS).enumerate() {
        for (c, &val) in pixel.iter().enumerate() {
            data[c * plane + i] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
        }
    }

    Array4::from_shape_vec((1, CHANNELS, size, size), data).map_err(|e| {
        CaptionError::Preprocess {
            message: format!("Failed to shape pixel tensor: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_preprocess_shape() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let tensor = preprocess(&img, 768).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 768, 768]);
    }

    #[test]
    fn test_preprocess_small_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 30));
        let tensor = preprocess(&img, 32).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_preprocess_imagenet_normalization() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 128])));
        let tensor = preprocess(&img, 4).unwrap();

        let r = tensor[[0, 0, 1, 1]];
        let g = tensor[[0, 1, 1, 1]];
        let b = tensor[[0, 2, 1, 1]];
        assert!((r - (1.0 - 0.485) / 0.229).abs() < 1e-3);
        assert!((g - (0.0 - 0.456) / 0.224).abs() < 1e-3);
        assert!((b - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_rejects_zero_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(matches!(
            preprocess(&img, 0),
            Err(CaptionError::Preprocess { .. })
        ));
    }
}
