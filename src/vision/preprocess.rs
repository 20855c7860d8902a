//! Display crop preprocessing for OCR
//!
//! Orients the frame, crops the located display and enhances it so the
//! seven-segment digits survive recognition.

use anyhow::Result;
use image::{imageops, imageops::FilterType, RgbaImage};
use tracing::debug;

use super::geometry::{NormalizedRect, PixelRect};
use super::tensor::crop;
use crate::config::PreprocessingConfig;
use crate::error::PipelineError;

/// Enhanced crop plus where it came from
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Processed image
    pub image: RgbaImage,
    /// Crop rectangle in oriented frame pixels
    pub crop: PixelRect,
    /// Upscale factor applied after cropping
    pub scale: u32,
}

/// Orient, crop, desaturate, boost contrast, upsample
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    settings: PreprocessingConfig,
}

impl ImagePreprocessor {
    pub fn new(settings: PreprocessingConfig) -> Self {
        Self { settings }
    }

    /// Process a region of an upright frame. `region` is top-left origin.
    pub fn process_image(&self, oriented: &RgbaImage, region: &NormalizedRect) -> Result<PreprocessResult> {
        let (width, height) = oriented.dimensions();
        let rect = region.to_pixels(width, height);
        if rect.is_empty() {
            return Err(PipelineError::invalid_frame(format!(
                "region {:?} is empty in a {}x{} frame",
                region, width, height
            ))
            .into());
        }

        let mut image = crop(oriented, &rect);

        if self.settings.grayscale {
            apply_grayscale(&mut image);
        }
        if (self.settings.contrast - 1.0).abs() > 0.01 {
            apply_contrast(&mut image, self.settings.contrast);
        }

        let scale = self.settings.scale.max(1);
        if scale > 1 {
            image = imageops::resize(&image, rect.width * scale, rect.height * scale, FilterType::Lanczos3);
        }

        debug!(
            "Preprocessed crop {}x{} at ({}, {}) -> {}x{}",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            image.width(),
            image.height()
        );

        Ok(PreprocessResult { image, crop: rect, scale })
    }
}

/// Contrast around the midpoint (128). Factor > 1.0 increases contrast.
fn apply_contrast(image: &mut RgbaImage, factor: f32) {
    for pixel in image.pixels_mut() {
        for c in 0..3 {
            let adjusted = ((pixel[c] as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
            pixel[c] = adjusted as u8;
        }
    }
}

/// Luminance grayscale, kept in RGBA layout
fn apply_grayscale(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let gray = (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32) as u8;
        pixel[0] = gray;
        pixel[1] = gray;
        pixel[2] = gray;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CapturedFrame, Orientation};
    use crate::error::is_frame_error;
    use image::Rgba;
    use std::time::Duration;

    /// Sensor-sized frame rotated upright
    fn upright(width: u32, height: u32, orientation: Orientation) -> RgbaImage {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
        CapturedFrame::from_image(image, orientation, Duration::ZERO)
            .to_oriented_image()
            .unwrap()
    }

    #[test]
    fn test_contrast_increase() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([100, 128, 200, 255]));
        apply_contrast(&mut image, 2.0);
        assert_eq!(image.get_pixel(0, 0), &Rgba([72, 128, 255, 255]));
    }

    #[test]
    fn test_grayscale() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        apply_grayscale(&mut image);
        assert_eq!(image.get_pixel(0, 0), &Rgba([76, 76, 76, 255]));
    }

    #[test]
    fn test_crop_and_upscale() {
        let preprocessor = ImagePreprocessor::default();
        let result = preprocessor
            .process_image(&upright(100, 50, Orientation::Up), &NormalizedRect::new(0.1, 0.2, 0.5, 0.4))
            .unwrap();

        assert_eq!(result.crop, PixelRect { x: 10, y: 10, width: 50, height: 20 });
        assert_eq!(result.scale, 2);
        assert_eq!(result.image.dimensions(), (100, 40));
        let p = result.image.get_pixel(50, 20);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_orientation_applied_before_crop() {
        let preprocessor = ImagePreprocessor::new(PreprocessingConfig {
            scale: 1,
            ..Default::default()
        });
        // Landscape sensor, portrait upright frame
        let result = preprocessor
            .process_image(&upright(100, 50, Orientation::Right), &NormalizedRect::new(0.0, 0.0, 1.0, 0.5))
            .unwrap();
        assert_eq!(result.crop, PixelRect { x: 0, y: 0, width: 50, height: 50 });
        assert_eq!(result.image.dimensions(), (50, 50));
    }

    #[test]
    fn test_empty_crop_is_frame_error() {
        let preprocessor = ImagePreprocessor::default();
        let err = preprocessor
            .process_image(&upright(100, 50, Orientation::Up), &NormalizedRect::new(1.2, 0.0, 0.5, 0.5))
            .unwrap_err();
        assert!(is_frame_error(&err));
    }
}
