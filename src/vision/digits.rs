//! Whole-frame digit classifier path
//!
//! A detector classifies individual seven-segment digits in a fixed region
//! of the frame. The digits are read left to right and interpreted as a
//! reading, contextually when possible.

use anyhow::{Context, Result};
use image::RgbaImage;
use ndarray::{Array2, ArrayView2};
use ort::value::Value;
use std::path::Path;
use tracing::debug;

use super::geometry::NormalizedRect;
use super::locator::best_class;
use super::models::OnnxSession;
use super::tensor::{center_square, crop, image_to_nchw, output_rows, resize_square, Normalization};
use crate::analysis::{MeterReading, MeterScreenType, SequentialLineScanner};
use crate::error::PipelineError;

/// Class index to digit label, in the order the model was trained with.
/// Index 2 is the literal "10".
pub const DIGIT_LABELS: [&str; 11] = ["0", "1", "10", "2", "3", "4", "5", "6", "7", "8", "9"];

pub const DEFAULT_THRESHOLD: f32 = 0.25;

/// Label for a class index; indices past the table render as the number
pub fn digit_label(index: usize) -> String {
    DIGIT_LABELS
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| index.to_string())
}

/// One classified digit
#[derive(Debug, Clone, PartialEq)]
pub struct DigitObservation {
    pub digit: String,
    /// Left edge (`cx - w/2`) used for ordering
    pub left_edge: f32,
}

/// Turns raw digit detections into readings
#[derive(Debug, Clone)]
pub struct DigitSequenceDetector {
    threshold: f32,
    scanner: SequentialLineScanner,
}

impl DigitSequenceDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            scanner: SequentialLineScanner::new(),
        }
    }

    /// Confident digits ordered left to right
    pub fn observations(&self, confidence: ArrayView2<f32>, coordinates: ArrayView2<f32>) -> Vec<DigitObservation> {
        let mut digits: Vec<DigitObservation> = confidence
            .outer_iter()
            .zip(coordinates.outer_iter())
            .filter_map(|(scores, coords)| {
                let (class, score) = best_class(scores.iter().copied())?;
                if score < self.threshold || coords.len() < 3 {
                    return None;
                }
                Some(DigitObservation {
                    digit: digit_label(class),
                    left_edge: coords[0] - coords[2] * 0.5,
                })
            })
            .collect();

        digits.sort_by(|a, b| a.left_edge.total_cmp(&b.left_edge));
        digits
    }

    /// Decode detector output into a digit string
    pub fn decode(&self, confidence: ArrayView2<f32>, coordinates: ArrayView2<f32>) -> String {
        self.observations(confidence, coordinates)
            .into_iter()
            .map(|d| d.digit)
            .collect()
    }

    /// Interpret a decoded digit string.
    ///
    /// The string is first scanned as a single text line; only when that
    /// yields nothing does an 8-character string count as the total.
    pub fn interpret(&self, digits: &str) -> Option<MeterReading> {
        if digits.is_empty() {
            return None;
        }

        self.scanner.scan(&[digits]).or_else(|| {
            (digits.chars().count() == 8).then(|| MeterReading::energy(MeterScreenType::Total, digits))
        })
    }

    pub fn detect(&self, confidence: ArrayView2<f32>, coordinates: ArrayView2<f32>) -> Option<MeterReading> {
        let digits = self.decode(confidence, coordinates);
        debug!("Digit classifier read \"{}\"", digits);
        self.interpret(&digits)
    }
}

impl Default for DigitSequenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// Produces per-digit `(confidence, coordinates)` tensors for a frame
pub trait DigitModel: Send {
    /// Run on an upright frame image
    fn infer(&mut self, image: &RgbaImage) -> Result<(Array2<f32>, Array2<f32>)>;
}

/// Digit detector exported to ONNX with NMS baked in
pub struct OnnxDigitModel {
    session: OnnxSession,
    input_size: u32,
    region_of_interest: NormalizedRect,
}

impl OnnxDigitModel {
    pub fn new(model_path: &Path, input_size: u32, region_of_interest: NormalizedRect, use_gpu: bool) -> Result<Self> {
        let session = OnnxSession::load("digit classifier", model_path, use_gpu)?;
        Ok(Self {
            session,
            input_size,
            region_of_interest,
        })
    }

    /// Region of interest, then the centered square the model sees
    fn model_input(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let (w, h) = image.dimensions();
        let roi = self.region_of_interest.to_pixels(w, h);
        if roi.is_empty() {
            return Err(PipelineError::invalid_frame(format!(
                "digit region {:?} is empty in a {}x{} frame",
                self.region_of_interest, w, h
            ))
            .into());
        }
        let (square, _) = center_square(&crop(image, &roi));
        Ok(resize_square(&square, self.input_size))
    }
}

impl DigitModel for OnnxDigitModel {
    fn infer(&mut self, image: &RgbaImage) -> Result<(Array2<f32>, Array2<f32>)> {
        let resized = self.model_input(image)?;
        let input = Value::from_array(image_to_nchw(&resized, &Normalization::UNIT))
            .context("Failed to create input tensor")?;

        let input_name = self.session.input_names().first().cloned().unwrap_or_default();
        let conf_idx = self.session.output_index("confidence", 0);
        let coord_idx = self.session.output_index("coordinates", 1);

        let outputs = self
            .session
            .session_mut()
            .run(ort::inputs![input_name => input])
            .context("Digit inference failed")?;

        let confidence = outputs[conf_idx]
            .try_extract_array::<f32>()
            .context("Failed to extract confidence tensor")?;
        let coordinates = outputs[coord_idx]
            .try_extract_array::<f32>()
            .context("Failed to extract coordinates tensor")?;

        Ok((
            output_rows(confidence)?.to_owned(),
            output_rows(coordinates)?.to_owned(),
        ))
    }
}

/// Digit path of the pipeline: model plus interpretation
pub struct DigitReader {
    model: Box<dyn DigitModel>,
    detector: DigitSequenceDetector,
}

impl DigitReader {
    pub fn new(model: Box<dyn DigitModel>, detector: DigitSequenceDetector) -> Self {
        Self { model, detector }
    }

    pub fn read(&mut self, image: &RgbaImage) -> Result<Option<MeterReading>> {
        let (confidence, coordinates) = self.model.infer(image)?;
        Ok(self.detector.detect(confidence.view(), coordinates.view()))
    }
}
