//! Text recognition layer
//!
//! Wraps a text-recognition engine behind [`TextRecognizer`] and turns its
//! raw output into filtered, origin-normalized [`TextObservation`]s.

use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use super::geometry::{NormalizedRect, Origin};

/// A piece of recognized text with its box in unit-square coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObservation {
    /// Top candidate string
    pub text: String,
    /// Bounding box (top-left origin once it leaves the source)
    pub bounds: NormalizedRect,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

impl TextObservation {
    pub fn new(text: impl Into<String>, bounds: NormalizedRect, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bounds,
            confidence,
        }
    }
}

/// Speed/precision trade-off for recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionLevel {
    Fast,
    /// Favors precision; the pipeline is throttled so latency is acceptable
    #[default]
    Accurate,
}

/// Options handed to the recognition engine on every call
#[derive(Debug, Clone)]
pub struct RecognitionOptions {
    /// Restricts the character set (digits and Latin)
    pub languages: Vec<String>,
    pub level: RecognitionLevel,
    /// Dictionary correction corrupts numeric strings, keep it off
    pub uses_language_correction: bool,
    /// Minimum text height as a fraction of image height
    pub minimum_text_height: f32,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            languages: vec!["en-US".to_string()],
            level: RecognitionLevel::Accurate,
            uses_language_correction: false,
            minimum_text_height: 0.03,
        }
    }
}

/// Text-recognition capability
pub trait TextRecognizer: Send {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Origin convention of the boxes this engine reports
    fn origin(&self) -> Origin {
        Origin::TopLeft
    }

    /// Recognize text in an image. Boxes are in the engine's native origin.
    fn recognize(&mut self, image: &RgbaImage, options: &RecognitionOptions) -> Result<Vec<TextObservation>>;
}

/// Recognition stage of the pipeline
pub struct TextObservationSource {
    recognizer: Box<dyn TextRecognizer>,
    options: RecognitionOptions,
}

impl TextObservationSource {
    pub fn new(recognizer: Box<dyn TextRecognizer>, options: RecognitionOptions) -> Self {
        if options.uses_language_correction {
            debug!("Language correction requested; numeric screens may be altered");
        }
        Self { recognizer, options }
    }

    /// Recognize text and normalize the results.
    ///
    /// Index order carries no meaning; consumers must rely on geometry.
    pub fn observe(&mut self, image: &RgbaImage) -> Result<Vec<TextObservation>> {
        let start = Instant::now();
        let origin = self.recognizer.origin();
        let raw = self.recognizer.recognize(image, &self.options)?;
        let raw_count = raw.len();

        let observations: Vec<TextObservation> = raw
            .into_iter()
            .filter(|obs| !obs.text.trim().is_empty())
            .filter(|obs| obs.bounds.height >= self.options.minimum_text_height)
            .map(|obs| TextObservation {
                bounds: obs.bounds.to_top_left_origin(origin),
                ..obs
            })
            .collect();

        debug!(
            "{} recognized {} observations ({} kept) in {:?}",
            self.recognizer.name(),
            raw_count,
            observations.len(),
            start.elapsed()
        );
        for obs in &observations {
            debug!("OCR \"{}\" conf={:.2} box={:?}", obs.text, obs.confidence, obs.bounds);
        }

        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRecognizer {
        origin: Origin,
        results: Vec<TextObservation>,
    }

    impl TextRecognizer for FixedRecognizer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn origin(&self) -> Origin {
            self.origin
        }

        fn recognize(&mut self, _image: &RgbaImage, _options: &RecognitionOptions) -> Result<Vec<TextObservation>> {
            Ok(self.results.clone())
        }
    }

    #[test]
    fn test_default_options() {
        let options = RecognitionOptions::default();
        assert_eq!(options.level, RecognitionLevel::Accurate);
        assert!(!options.uses_language_correction);
        assert!((options.minimum_text_height - 0.03).abs() < 1e-6);
        assert_eq!(options.languages, vec!["en-US".to_string()]);
    }

    #[test]
    fn test_source_filters_small_text() {
        let recognizer = FixedRecognizer {
            origin: Origin::TopLeft,
            results: vec![
                TextObservation::new("1580", NormalizedRect::new(0.1, 0.1, 0.2, 0.1), 0.9),
                TextObservation::new("noise", NormalizedRect::new(0.1, 0.5, 0.2, 0.01), 0.9),
                TextObservation::new("  ", NormalizedRect::new(0.1, 0.7, 0.2, 0.1), 0.9),
            ],
        };
        let mut source = TextObservationSource::new(Box::new(recognizer), RecognitionOptions::default());
        let image = RgbaImage::new(4, 4);
        let observations = source.observe(&image).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].text, "1580");
    }

    #[test]
    fn test_source_flips_bottom_left_once() {
        let recognizer = FixedRecognizer {
            origin: Origin::BottomLeft,
            results: vec![TextObservation::new("1581", NormalizedRect::new(0.1, 0.7, 0.2, 0.1), 0.9)],
        };
        let mut source = TextObservationSource::new(Box::new(recognizer), RecognitionOptions::default());
        let observations = source.observe(&RgbaImage::new(4, 4)).unwrap();
        assert!((observations[0].bounds.y - 0.2).abs() < 1e-6);
    }
}
