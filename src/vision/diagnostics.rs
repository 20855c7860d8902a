//! Debug images of the pipeline stages
//!
//! Purely observational: nothing here feeds back into detection.

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;
use tracing::debug;

use super::geometry::NormalizedRect;
use super::ocr::TextObservation;
use crate::analysis::SpatialFieldMatcher;

const CODE_COLOR: Rgba<u8> = Rgba([0, 200, 0, 255]);
const VALUE_COLOR: Rgba<u8> = Rgba([160, 32, 240, 255]);
const DISPLAY_COLOR: Rgba<u8> = Rgba([0, 200, 0, 255]);

/// Pipeline stage an image was captured at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticStage {
    /// Full frame with the located display box
    Located,
    /// Enhanced crop handed to OCR
    Preprocessed,
    /// Crop with code and value boxes drawn
    Annotated,
}

impl DiagnosticStage {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticStage::Located => "located",
            DiagnosticStage::Preprocessed => "preprocessed",
            DiagnosticStage::Annotated => "annotated",
        }
    }
}

/// Receiver for debug images
pub trait DiagnosticSink: Send {
    fn emit(&self, sequence: u64, stage: DiagnosticStage, image: &RgbaImage) -> Result<()>;
}

/// Writes `frame-{seq:06}-{stage}.png` files into a directory
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create diagnostics dir {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, sequence: u64, stage: DiagnosticStage) -> PathBuf {
        self.dir.join(format!("frame-{:06}-{}.png", sequence, stage.name()))
    }
}

impl DiagnosticSink for DirectorySink {
    fn emit(&self, sequence: u64, stage: DiagnosticStage, image: &RgbaImage) -> Result<()> {
        let path = self.path_for(sequence, stage);
        image
            .save(&path)
            .with_context(|| format!("Failed to write diagnostic image {:?}", path))?;
        debug!("Wrote {:?}", path);
        Ok(())
    }
}

fn draw_box(image: &mut RgbaImage, bounds: &NormalizedRect, color: Rgba<u8>) {
    let (w, h) = image.dimensions();
    let px = bounds.to_pixels(w, h);
    if px.is_empty() {
        return;
    }
    draw_hollow_rect_mut(image, Rect::at(px.x as i32, px.y as i32).of_size(px.width, px.height), color);
}

/// Frame with the located display outlined
pub fn draw_located(frame: &RgbaImage, display: &NormalizedRect) -> RgbaImage {
    let mut image = frame.clone();
    draw_box(&mut image, display, DISPLAY_COLOR);
    image
}

/// Crop with field codes in green and their qualifying values in purple
pub fn annotate(crop: &RgbaImage, observations: &[TextObservation]) -> RgbaImage {
    let matcher = SpatialFieldMatcher::new();
    let codes = matcher.field_codes(observations);
    let candidates = matcher.value_candidates(observations);

    let mut image = crop.clone();
    for code in &codes {
        draw_box(&mut image, &code.bounds, CODE_COLOR);
    }
    for code in &codes {
        for candidate in candidates
            .iter()
            .filter(|c| SpatialFieldMatcher::is_value_slot(&code.bounds, &c.bounds))
        {
            draw_box(&mut image, &candidate.bounds, VALUE_COLOR);
        }
    }
    image
}
