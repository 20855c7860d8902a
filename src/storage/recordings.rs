//! Recorded OCR output
//!
//! A recording holds the raw observations an engine produced for a sequence
//! of frames, in that engine's coordinate convention:
//!
//! ```json
//! { "origin": "bottom_left",
//!   "frames": [ { "observations": [
//!     { "text": "1581", "bounds": { "x": 0.2, "y": 0.8, "width": 0.3, "height": 0.1 }, "confidence": 0.9 }
//!   ] } ] }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::vision::{Origin, TextObservation};

/// Observations recognized in one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub observations: Vec<TextObservation>,
}

/// A sequence of recorded frames
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
    /// Origin convention the boxes were recorded in
    #[serde(default)]
    pub origin: Origin,
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read recording {:?}", path))?;
        let recording: Recording =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse recording {:?}", path))?;
        info!(
            "Loaded recording with {} frames ({:?} origin) from {:?}",
            recording.frames.len(),
            recording.origin,
            path
        );
        Ok(recording)
    }

    /// Frames with every box converted to top-left origin
    pub fn frames_top_left(&self) -> Vec<Vec<TextObservation>> {
        self.frames
            .iter()
            .map(|frame| {
                frame
                    .observations
                    .iter()
                    .map(|obs| TextObservation {
                        bounds: obs.bounds.to_top_left_origin(self.origin),
                        ..obs.clone()
                    })
                    .collect()
            })
            .collect()
    }
}
