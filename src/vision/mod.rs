//! Vision Layer
//!
//! Everything that looks at pixels:
//! - Display localization with an object detector
//! - Crop preprocessing for OCR
//! - Text recognition (PaddleOCR via ONNX Runtime, or Windows OCR)
//! - The whole-frame digit classifier
//! - Debug image output

pub mod diagnostics;
pub mod digits;
pub mod geometry;
pub mod locator;
pub mod models;
pub mod ocr;
pub mod paddle_ocr;
pub mod preprocess;
pub mod tensor;
#[cfg(windows)]
pub mod windows_ocr;

pub use diagnostics::{DiagnosticSink, DiagnosticStage, DirectorySink};
pub use digits::{DigitReader, DigitSequenceDetector, OnnxDigitModel};
pub use geometry::{NormalizedRect, Origin, PixelRect};
pub use locator::{Detection, ObjectLocator, OnnxObjectLocator, RegionLocator};
pub use models::{ModelManager, ModelType};
pub use ocr::{RecognitionLevel, RecognitionOptions, TextObservation, TextObservationSource, TextRecognizer};
pub use paddle_ocr::PaddleOcr;
pub use preprocess::ImagePreprocessor;

use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::CapturedFrame;
use crate::config::AppConfig;
use crate::error::PipelineError;

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// Windows built-in OCR
    WindowsOcr,
    /// PaddleOCR via ONNX Runtime
    PaddleOcr,
}

impl Default for OcrBackend {
    fn default() -> Self {
        if cfg!(windows) {
            OcrBackend::WindowsOcr
        } else {
            OcrBackend::PaddleOcr
        }
    }
}

/// Build the configured text recognizer
pub fn create_recognizer(config: &AppConfig, models: &ModelManager) -> Result<Box<dyn TextRecognizer>> {
    match config.ocr.backend {
        OcrBackend::PaddleOcr => Ok(Box::new(PaddleOcr::from_manager(models, config.ocr.use_gpu)?)),
        #[cfg(windows)]
        OcrBackend::WindowsOcr => Ok(Box::new(windows_ocr::WindowsOcr::new(&config.ocr.languages).map_err(
            |e| PipelineError::unavailable("windows ocr", format!("{:#}", e)),
        )?)),
        #[cfg(not(windows))]
        OcrBackend::WindowsOcr => {
            Err(PipelineError::unavailable("windows ocr", "only available on Windows").into())
        }
    }
}

/// Text path of the pipeline: locate, preprocess, recognize
pub struct VisionPipeline {
    locator: RegionLocator,
    preprocessor: ImagePreprocessor,
    source: TextObservationSource,
    diagnostics: Option<Box<dyn DiagnosticSink>>,
}

impl VisionPipeline {
    pub fn new(locator: RegionLocator, preprocessor: ImagePreprocessor, source: TextObservationSource) -> Self {
        Self {
            locator,
            preprocessor,
            source,
            diagnostics: None,
        }
    }

    /// Build from configuration, loading every model up front
    pub fn from_config(config: &AppConfig, models: &ModelManager) -> Result<Self> {
        let locator_path = models.resolve(ModelType::ScreenBoundary, config.locator.model_path.as_deref())?;
        let detector = OnnxObjectLocator::new(
            &locator_path,
            config.locator.input_size,
            config.locator.confidence_threshold,
            config.ocr.use_gpu,
        )?;
        let recognizer = create_recognizer(config, models)?;

        Ok(Self::new(
            RegionLocator::new(Box::new(detector), config.locator.display_class),
            ImagePreprocessor::new(config.preprocessing.clone()),
            TextObservationSource::new(recognizer, config.ocr.recognition_options()),
        ))
    }

    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Observations for the display in a frame, or `None` when no display
    /// was located
    pub fn observe(&mut self, sequence: u64, frame: &CapturedFrame) -> Result<Option<Vec<TextObservation>>> {
        let image = frame.to_oriented_image()?;

        let Some(display) = self.locator.locate_display(&image)? else {
            debug!("Frame {}: no display located", sequence);
            return Ok(None);
        };
        self.emit(sequence, DiagnosticStage::Located, || {
            diagnostics::draw_located(&image, &display.bounds)
        });

        let processed = self.preprocessor.process_image(&image, &display.bounds)?;
        debug!(
            "Frame {}: display crop {:?} upscaled x{}",
            sequence, processed.crop, processed.scale
        );
        self.emit(sequence, DiagnosticStage::Preprocessed, || processed.image.clone());

        let observations = self.source.observe(&processed.image)?;
        self.emit(sequence, DiagnosticStage::Annotated, || {
            diagnostics::annotate(&processed.image, &observations)
        });

        Ok(Some(observations))
    }

    fn emit<F>(&self, sequence: u64, stage: DiagnosticStage, render: F)
    where
        F: FnOnce() -> RgbaImage,
    {
        if let Some(sink) = &self.diagnostics {
            if let Err(e) = sink.emit(sequence, stage, &render()) {
                warn!("Diagnostic output failed: {:#}", e);
            }
        }
    }
}

/// Digit path built from configuration
pub fn digit_reader_from_config(config: &AppConfig, models: &ModelManager) -> Result<DigitReader> {
    let path = models.resolve(ModelType::Digits, config.digits.model_path.as_deref())?;
    let model = OnnxDigitModel::new(
        &path,
        config.digits.input_size,
        config.digits.region_of_interest,
        config.ocr.use_gpu,
    )?;
    Ok(DigitReader::new(
        Box::new(model),
        DigitSequenceDetector::new(config.digits.confidence_threshold),
    ))
}
