//! PaddleOCR text recognizer on ONNX Runtime
//!
//! Detection runs the DB network and turns its probability map into boxes
//! with connected components. Each box is then read by the CRNN model and
//! decoded with CTC against the character dictionary.

use anyhow::{Context, Result};
use image::{imageops, imageops::FilterType, GrayImage, Luma, RgbaImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::ArrayView2;
use ort::value::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use super::geometry::{NormalizedRect, PixelRect};
use super::locator::best_class;
use super::models::{ModelManager, ModelType, OnnxSession};
use super::ocr::{RecognitionLevel, RecognitionOptions, TextObservation, TextRecognizer};
use super::tensor::{crop, detection_size, image_to_nchw, output_rows, resize_for_recognition, Normalization};

/// Probability above which a map pixel counts as text
const DET_THRESHOLD: f32 = 0.3;
/// Minimum mean probability of a box
const BOX_THRESHOLD: f32 = 0.5;
/// Expansion applied to the shrunk DB regions
const UNCLIP_RATIO: f32 = 1.5;
/// Smallest box side kept, in map pixels
const MIN_BOX_SIDE: u32 = 3;

const REC_HEIGHT: u32 = 48;
const REC_MAX_WIDTH: u32 = 640;

/// Text box in detection map pixels with its mean probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl TextBox {
    /// Grow the box by `area * ratio / perimeter` on every side
    pub fn unclip(&self, ratio: f32) -> Self {
        let perimeter = 2.0 * (self.width + self.height);
        if perimeter <= 0.0 {
            return *self;
        }
        let distance = self.width * self.height * ratio / perimeter;
        Self {
            x: self.x - distance,
            y: self.y - distance,
            width: self.width + 2.0 * distance,
            height: self.height + 2.0 * distance,
            score: self.score,
        }
    }

    /// Map into an image of `width`x`height`, clamped to it
    fn to_image_rect(&self, scale_x: f32, scale_y: f32, width: u32, height: u32) -> PixelRect {
        let x0 = (self.x * scale_x).max(0.0).round() as u32;
        let y0 = (self.y * scale_y).max(0.0).round() as u32;
        let x1 = (((self.x + self.width) * scale_x).round() as u32).min(width);
        let y1 = (((self.y + self.height) * scale_y).round() as u32).min(height);
        PixelRect {
            x: x0.min(width),
            y: y0.min(height),
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }
}

/// Extract text boxes from a DB probability map (`[H, W]`)
pub fn text_boxes(prob: ArrayView2<f32>, det_threshold: f32, box_threshold: f32, unclip_ratio: f32) -> Vec<TextBox> {
    let (h, w) = prob.dim();
    let mask = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        if prob[[y as usize, x as usize]] > det_threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    // label -> (min_x, min_y, max_x, max_y, prob sum, count)
    let mut regions: BTreeMap<u32, (u32, u32, u32, u32, f32, u32)> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        let p = prob[[y as usize, x as usize]];
        regions
            .entry(label)
            .and_modify(|r| {
                r.0 = r.0.min(x);
                r.1 = r.1.min(y);
                r.2 = r.2.max(x);
                r.3 = r.3.max(y);
                r.4 += p;
                r.5 += 1;
            })
            .or_insert((x, y, x, y, p, 1));
    }

    regions
        .into_values()
        .filter_map(|(min_x, min_y, max_x, max_y, sum, count)| {
            let width = max_x - min_x + 1;
            let height = max_y - min_y + 1;
            if width.min(height) < MIN_BOX_SIDE {
                return None;
            }
            let score = sum / count as f32;
            if score < box_threshold {
                return None;
            }
            let text_box = TextBox {
                x: min_x as f32,
                y: min_y as f32,
                width: width as f32,
                height: height as f32,
                score,
            };
            Some(text_box.unclip(unclip_ratio))
        })
        .collect()
}

/// Greedy CTC decoding of `[T, C]` class probabilities.
///
/// Class 0 is the blank, classes `1..=dict.len()` map to the dictionary and
/// the class after that is a space. Returns the text and the mean
/// probability of the emitted characters.
pub fn ctc_greedy_decode(probs: ArrayView2<f32>, dictionary: &[String]) -> (String, f32) {
    let mut text = String::new();
    let mut scores: Vec<f32> = Vec::new();
    let mut previous = 0usize;

    for row in probs.outer_iter() {
        let Some((class, score)) = best_class(row.iter().copied()) else {
            continue;
        };
        if class != 0 && class != previous {
            let symbol = match class {
                c if c <= dictionary.len() => Some(dictionary[c - 1].as_str()),
                c if c == dictionary.len() + 1 => Some(" "),
                _ => None,
            };
            if let Some(symbol) = symbol {
                text.push_str(symbol);
                scores.push(score);
            }
        }
        previous = class;
    }

    let confidence = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    };
    (text, confidence)
}

/// Drop characters outside the requested languages' script.
///
/// English-only requests keep ASCII, which covers the digits and Latin
/// markers printed on the display.
pub fn filter_charset(text: &str, languages: &[String]) -> String {
    let latin_only = !languages.is_empty() && languages.iter().all(|l| l.to_ascii_lowercase().starts_with("en"));
    if latin_only {
        text.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
    } else {
        text.to_string()
    }
}

fn load_dictionary(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read dictionary {:?}", path))?;
    Ok(content
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect())
}

/// PaddleOCR detection + recognition
pub struct PaddleOcr {
    detection: OnnxSession,
    recognition: OnnxSession,
    dictionary: Vec<String>,
}

impl PaddleOcr {
    pub fn new(det_path: &Path, rec_path: &Path, dict_path: &Path, use_gpu: bool) -> Result<Self> {
        let detection = OnnxSession::load("text detection", det_path, use_gpu)?;
        let recognition = OnnxSession::load("text recognition", rec_path, use_gpu)?;
        let dictionary = load_dictionary(dict_path)?;
        info!("PaddleOCR ready with {} dictionary symbols", dictionary.len());

        Ok(Self {
            detection,
            recognition,
            dictionary,
        })
    }

    /// Load (downloading if needed) the models from a model manager
    pub fn from_manager(manager: &ModelManager, use_gpu: bool) -> Result<Self> {
        let det = manager.ensure_model(ModelType::TextDetection)?;
        let rec = manager.ensure_model(ModelType::TextRecognition)?;
        let dict = manager.ensure_model(ModelType::Dictionary)?;
        Self::new(&det, &rec, &dict, use_gpu)
    }

    fn detect(&mut self, image: &RgbaImage, limit: u32) -> Result<Vec<PixelRect>> {
        let (width, height) = image.dimensions();
        let (dw, dh) = detection_size(width, height, limit);
        let resized = imageops::resize(image, dw, dh, FilterType::Triangle);

        let input = Value::from_array(image_to_nchw(&resized, &Normalization::PADDLE))
            .context("Failed to create detection tensor")?;
        let input_name = self.detection.input_names().first().cloned().unwrap_or_default();

        let outputs = self
            .detection
            .session_mut()
            .run(ort::inputs![input_name => input])
            .context("Detection inference failed")?;
        let map = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract probability map")?;

        // [1, 1, H, W] -> [H, W]
        let shape = map.shape().to_vec();
        if shape.len() != 4 {
            anyhow::bail!("Unexpected detection output shape {:?}", shape);
        }
        let prob = map
            .into_shape_with_order((shape[2], shape[3]))
            .context("Failed to reshape probability map")?;

        let scale_x = width as f32 / shape[3] as f32;
        let scale_y = height as f32 / shape[2] as f32;
        let rects = text_boxes(prob.view(), DET_THRESHOLD, BOX_THRESHOLD, UNCLIP_RATIO)
            .iter()
            .map(|b| b.to_image_rect(scale_x, scale_y, width, height))
            .filter(|r| !r.is_empty())
            .collect();
        Ok(rects)
    }

    fn read_line(&mut self, line: &RgbaImage) -> Result<(String, f32)> {
        let resized = resize_for_recognition(line, REC_HEIGHT, REC_MAX_WIDTH);
        let input = Value::from_array(image_to_nchw(&resized, &Normalization::PADDLE))
            .context("Failed to create recognition tensor")?;
        let input_name = self.recognition.input_names().first().cloned().unwrap_or_default();

        let outputs = self
            .recognition
            .session_mut()
            .run(ort::inputs![input_name => input])
            .context("Recognition inference failed")?;
        let probs = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract recognition output")?;

        Ok(ctc_greedy_decode(output_rows(probs)?, &self.dictionary))
    }
}

impl TextRecognizer for PaddleOcr {
    fn name(&self) -> &'static str {
        "paddle-ocr"
    }

    fn recognize(&mut self, image: &RgbaImage, options: &RecognitionOptions) -> Result<Vec<TextObservation>> {
        let limit = match options.level {
            RecognitionLevel::Fast => 640,
            RecognitionLevel::Accurate => 960,
        };

        let (width, height) = image.dimensions();
        let rects = self.detect(image, limit)?;
        debug!("PaddleOCR detected {} text boxes", rects.len());

        let mut observations = Vec::with_capacity(rects.len());
        for rect in rects {
            let (raw, confidence) = self.read_line(&crop(image, &rect))?;
            let text = filter_charset(&raw, &options.languages);
            if text.trim().is_empty() {
                continue;
            }
            let bounds = NormalizedRect::from_pixels((rect.x, rect.y, rect.width, rect.height), width, height);
            observations.push(TextObservation::new(text, bounds, confidence));
        }

        Ok(observations)
    }
}
