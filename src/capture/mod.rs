//! Frame Capture Layer
//!
//! Frame sources feeding the pipeline. Camera session handling lives outside
//! this crate; the shipped source replays still images as a timed stream.

pub mod frame;
pub mod gate;

pub use frame::{CapturedFrame, Orientation};
pub use gate::FrameGate;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Image file extensions picked up from a frame directory
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Anything that yields frames in capture order
pub trait FrameSource {
    /// Next frame, or `None` when the stream has ended
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

/// Replays image files as a camera stream
///
/// Timestamps are synthesized from the configured frame rate so the
/// admission gate behaves as it would on a live feed.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    frame_interval: Duration,
    orientation: Orientation,
}

impl ImageSequenceSource {
    /// Open a single image or a directory of images (sorted by file name)
    pub fn open(path: &Path, fps: u32, orientation: Orientation) -> Result<Self> {
        let paths = if path.is_dir() {
            list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            bail!("Input path does not exist: {:?}", path);
        };

        if paths.is_empty() {
            bail!("No images found in {:?}", path);
        }

        info!("Replaying {} frame(s) from {:?} at {} fps", paths.len(), path, fps);
        Ok(Self::from_paths(paths, fps, orientation))
    }

    pub fn from_paths(paths: Vec<PathBuf>, fps: u32, orientation: Orientation) -> Self {
        Self {
            paths,
            position: 0,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            orientation,
        }
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };

        let image = image::open(path)
            .with_context(|| format!("Failed to decode frame {:?}", path))?
            .to_rgba8();
        let timestamp = self.frame_interval * self.position as u32;
        self.position += 1;

        debug!("Frame {:?} ({}x{}) at {:?}", path, image.width(), image.height(), timestamp);
        Ok(Some(CapturedFrame::from_image(image, self.orientation, timestamp)))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read frame directory {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}
