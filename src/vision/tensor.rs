//! Tensor preparation for ONNX models
//!
//! Resizing, normalization and NCHW conversion shared by the locator, the
//! digit classifier and the PaddleOCR models.

use anyhow::{bail, Result};
use image::{imageops, imageops::FilterType, RgbaImage};
use ndarray::{Array4, ArrayView2, ArrayViewD, Axis, Ix2};

use super::geometry::PixelRect;

/// Per-channel normalization applied after scaling pixels to 0-1
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    /// Mean values [R, G, B]
    pub mean: [f32; 3],
    /// Std values [R, G, B]
    pub std: [f32; 3],
}

impl Normalization {
    /// Plain 0-1 scaling (YOLO-style exports)
    pub const UNIT: Normalization = Normalization {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
    };

    /// PaddleOCR maps [0, 255] to [-1, 1]
    pub const PADDLE: Normalization = Normalization {
        mean: [0.5, 0.5, 0.5],
        std: [0.5, 0.5, 0.5],
    };
}

/// Convert an RGBA image to a normalized NCHW tensor (batch size 1)
pub fn image_to_nchw(image: &RgbaImage, norm: &Normalization) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - norm.mean[c]) / norm.std[c];
        }
    }

    tensor
}

/// Stretch an image to a square model input
pub fn resize_square(image: &RgbaImage, size: u32) -> RgbaImage {
    imageops::resize(image, size, size, FilterType::Triangle)
}

/// Largest centered square inside the image
pub fn center_square(image: &RgbaImage) -> (RgbaImage, PixelRect) {
    let (w, h) = image.dimensions();
    let side = w.min(h);
    let rect = PixelRect {
        x: (w - side) / 2,
        y: (h - side) / 2,
        width: side,
        height: side,
    };
    (crop(image, &rect), rect)
}

/// Copy out a pixel region
pub fn crop(image: &RgbaImage, rect: &PixelRect) -> RgbaImage {
    imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Detection input size: longest side capped at `limit`, both sides rounded
/// to multiples of 32 as the DB network requires
pub fn detection_size(width: u32, height: u32, limit: u32) -> (u32, u32) {
    let longest = width.max(height).max(1) as f32;
    let ratio = if longest > limit as f32 { limit as f32 / longest } else { 1.0 };

    let round32 = |v: f32| (((v / 32.0).round() as u32) * 32).max(32);
    (round32(width as f32 * ratio), round32(height as f32 * ratio))
}

/// Recognition input width for a crop scaled to `target_height`
pub fn recognition_width(width: u32, height: u32, target_height: u32, max_width: u32) -> u32 {
    if height == 0 {
        return 1;
    }
    let scaled = (width as f32 * target_height as f32 / height as f32).ceil() as u32;
    scaled.clamp(1, max_width)
}

/// Resize a text crop to the recognition model's fixed height
pub fn resize_for_recognition(image: &RgbaImage, target_height: u32, max_width: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let new_w = recognition_width(w, h, target_height, max_width);
    imageops::resize(image, new_w, target_height, FilterType::Triangle)
}

/// View a `[N, K]` model output, dropping a leading batch axis of 1
pub fn output_rows(view: ArrayViewD<'_, f32>) -> Result<ArrayView2<'_, f32>> {
    let view = match view.ndim() {
        2 => view,
        3 if view.shape()[0] == 1 => view.index_axis_move(Axis(0), 0),
        _ => bail!("Unexpected output shape {:?}, expected [N, K]", view.shape()),
    };
    Ok(view.into_dimensionality::<Ix2>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_output_rows() {
        let batched = Array3::<f32>::zeros((1, 5, 4));
        assert_eq!(output_rows(batched.view().into_dyn()).unwrap().dim(), (5, 4));

        let plain = Array2::<f32>::zeros((3, 11));
        assert_eq!(output_rows(plain.view().into_dyn()).unwrap().dim(), (3, 11));

        let bad = Array3::<f32>::zeros((2, 5, 4));
        assert!(output_rows(bad.view().into_dyn()).is_err());
    }

    #[test]
    fn test_image_to_nchw() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([0, 255, 0, 255]));

        let tensor = image_to_nchw(&image, &Normalization::UNIT);
        assert_eq!(tensor.dim(), (1, 3, 1, 2));
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 0, 0]].abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_paddle_normalization_range() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([0, 255, 0, 255]));
        let tensor = image_to_nchw(&image, &Normalization::PADDLE);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_center_square() {
        let image = RgbaImage::new(10, 4);
        let (square, rect) = center_square(&image);
        assert_eq!(square.dimensions(), (4, 4));
        assert_eq!(rect, PixelRect { x: 3, y: 0, width: 4, height: 4 });
    }

    #[test]
    fn test_detection_size() {
        assert_eq!(detection_size(1920, 1080, 960), (960, 544));
        assert_eq!(detection_size(100, 50, 960), (96, 64));
        assert_eq!(detection_size(10, 10, 960), (32, 32));
    }

    #[test]
    fn test_recognition_width() {
        assert_eq!(recognition_width(200, 24, 48, 640), 400);
        assert_eq!(recognition_width(2000, 24, 48, 640), 640);
        assert_eq!(recognition_width(10, 0, 48, 640), 1);
    }
}
