//! Display region localization
//!
//! Finds the meter's digital display in a frame with an object detector.

use anyhow::{Context, Result};
use image::RgbaImage;
use ndarray::ArrayView2;
use ort::value::Value;
use std::path::Path;
use tracing::debug;

use super::geometry::NormalizedRect;
use super::models::OnnxSession;
use super::tensor::{image_to_nchw, output_rows, resize_square, Normalization};

/// One object found by the detector
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    /// Unit-square box, top-left origin
    pub bounds: NormalizedRect,
}

/// Object-localization capability
pub trait ObjectLocator: Send {
    fn name(&self) -> &'static str;

    /// All detections in an upright image
    fn locate(&mut self, image: &RgbaImage) -> Result<Vec<Detection>>;
}

/// Picks the display out of the detector's results
pub struct RegionLocator {
    locator: Box<dyn ObjectLocator>,
    display_class: usize,
}

impl RegionLocator {
    pub fn new(locator: Box<dyn ObjectLocator>, display_class: usize) -> Self {
        Self { locator, display_class }
    }

    /// Highest-confidence display detection, if any
    pub fn locate_display(&mut self, image: &RgbaImage) -> Result<Option<Detection>> {
        let detections = self.locator.locate(image)?;
        let best = detections
            .into_iter()
            .filter(|d| d.class_id == self.display_class)
            .filter(|d| d.bounds.width > 0.0 && d.bounds.height > 0.0)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        match &best {
            Some(d) => debug!("{} located display {:?} ({:.2})", self.locator.name(), d.bounds, d.confidence),
            None => debug!("{} found no display", self.locator.name()),
        }
        Ok(best)
    }
}

/// Turn NMS'd detector outputs into detections.
///
/// `confidence` is `[N, classes]`, `coordinates` is `[N, 4]` holding
/// normalized `cx, cy, w, h`.
pub fn decode_detections(
    confidence: ArrayView2<f32>,
    coordinates: ArrayView2<f32>,
    threshold: f32,
) -> Vec<Detection> {
    confidence
        .outer_iter()
        .zip(coordinates.outer_iter())
        .filter_map(|(scores, coords)| {
            let (class_id, score) = best_class(scores.iter().copied())?;
            if score < threshold || coords.len() < 4 {
                return None;
            }
            Some(Detection {
                class_id,
                confidence: score,
                bounds: NormalizedRect::from_center(coords[0], coords[1], coords[2], coords[3]).clamped(),
            })
        })
        .collect()
}

/// Index and score of the best class; the first maximum wins ties.
/// NaN scores never win.
pub fn best_class(scores: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
    scores
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
            Some((_, b)) if s <= b => best,
            _ => Some((i, s)),
        })
}

/// Screen boundary detector exported to ONNX with NMS baked in
pub struct OnnxObjectLocator {
    session: OnnxSession,
    input_size: u32,
    confidence_threshold: f32,
}

impl OnnxObjectLocator {
    pub fn new(model_path: &Path, input_size: u32, confidence_threshold: f32, use_gpu: bool) -> Result<Self> {
        let session = OnnxSession::load("region locator", model_path, use_gpu)?;
        Ok(Self {
            session,
            input_size,
            confidence_threshold,
        })
    }
}

impl ObjectLocator for OnnxObjectLocator {
    fn name(&self) -> &'static str {
        "onnx-locator"
    }

    fn locate(&mut self, image: &RgbaImage) -> Result<Vec<Detection>> {
        let resized = resize_square(image, self.input_size);
        let input = Value::from_array(image_to_nchw(&resized, &Normalization::UNIT))
            .context("Failed to create input tensor")?;

        let input_name = self.session.input_names().first().cloned().unwrap_or_default();
        let conf_idx = self.session.output_index("confidence", 0);
        let coord_idx = self.session.output_index("coordinates", 1);

        let outputs = self
            .session
            .session_mut()
            .run(ort::inputs![input_name => input])
            .context("Locator inference failed")?;

        let confidence = outputs[conf_idx]
            .try_extract_array::<f32>()
            .context("Failed to extract confidence tensor")?;
        let coordinates = outputs[coord_idx]
            .try_extract_array::<f32>()
            .context("Failed to extract coordinates tensor")?;

        Ok(decode_detections(
            output_rows(confidence)?,
            output_rows(coordinates)?,
            self.confidence_threshold,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct FixedLocator(Vec<Detection>);

    impl ObjectLocator for FixedLocator {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn locate(&mut self, _image: &RgbaImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn detection(class_id: usize, confidence: f32) -> Detection {
        Detection {
            class_id,
            confidence,
            bounds: NormalizedRect::new(0.1, 0.1, 0.5, 0.5),
        }
    }

    #[test]
    fn test_locate_display_picks_best_of_class() {
        let fixed = FixedLocator(vec![detection(0, 0.4), detection(1, 0.99), detection(0, 0.8)]);
        let mut locator = RegionLocator::new(Box::new(fixed), 0);
        let best = locator.locate_display(&RgbaImage::new(4, 4)).unwrap().unwrap();
        assert_eq!(best.class_id, 0);
        assert!((best.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_locate_display_none() {
        let mut locator = RegionLocator::new(Box::new(FixedLocator(vec![detection(1, 0.9)])), 0);
        assert!(locator.locate_display(&RgbaImage::new(4, 4)).unwrap().is_none());
    }

    #[test]
    fn test_decode_detections() {
        let confidence = array![[0.9_f32, 0.1], [0.1, 0.2], [0.3, 0.6]];
        let coordinates = array![[0.5_f32, 0.5, 0.4, 0.2], [0.1, 0.1, 0.1, 0.1], [0.2, 0.2, 0.2, 0.2]];
        let detections = decode_detections(confidence.view(), coordinates.view(), 0.25);

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 0);
        assert!((detections[0].bounds.x - 0.3).abs() < 1e-6);
        assert!((detections[0].bounds.y - 0.4).abs() < 1e-6);
        assert_eq!(detections[1].class_id, 1);
    }

    #[test]
    fn test_best_class_first_max_wins() {
        assert_eq!(best_class([0.2, 0.7, 0.7].into_iter()), Some((1, 0.7)));
        assert_eq!(best_class(std::iter::empty()), None);
    }

    #[test]
    fn test_best_class_ignores_nan() {
        assert_eq!(best_class([0.9, 0.0, f32::NAN].into_iter()), Some((0, 0.9)));
        assert_eq!(best_class([f32::NAN, 0.3].into_iter()), Some((1, 0.3)));
        assert_eq!(best_class([f32::NAN, f32::NAN].into_iter()), None);

        let confidence = array![[f32::NAN, f32::NAN], [0.8_f32, f32::NAN]];
        let coordinates = array![[0.5_f32, 0.5, 0.2, 0.2], [0.5, 0.5, 0.2, 0.2]];
        let detections = decode_detections(confidence.view(), coordinates.view(), 0.25);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 0);
    }
}
