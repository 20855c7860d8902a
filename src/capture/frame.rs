//! Frame data structures for captured camera content

use anyhow::Result;
use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;

/// How the sensor image must be rotated to appear upright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Already upright
    #[default]
    Up,
    /// Rotate 90 degrees clockwise (portrait phone, landscape sensor)
    Right,
    /// Rotate 180 degrees
    Down,
    /// Rotate 90 degrees counter-clockwise
    Left,
}

impl Orientation {
    /// Rotate an image into upright orientation
    pub fn apply(&self, image: RgbaImage) -> RgbaImage {
        match self {
            Orientation::Up => image,
            Orientation::Right => imageops::rotate90(&image),
            Orientation::Down => imageops::rotate180(&image),
            Orientation::Left => imageops::rotate270(&image),
        }
    }
}

/// A captured camera frame
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Orientation hint from the capture device
    pub orientation: Orientation,
    /// Capture time as an offset from stream start
    pub timestamp: Duration,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(data: Vec<u8>, width: u32, height: u32, orientation: Orientation, timestamp: Duration) -> Self {
        Self {
            data,
            width,
            height,
            orientation,
            timestamp,
        }
    }

    /// Wrap an already decoded image
    pub fn from_image(image: RgbaImage, orientation: Orientation, timestamp: Duration) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, orientation, timestamp)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Validate the buffer and view it as an image in sensor orientation
    pub fn to_image(&self) -> Result<RgbaImage> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::invalid_frame("zero-sized frame").into());
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.data.len() != expected {
            return Err(PipelineError::invalid_frame(format!(
                "buffer holds {} bytes, expected {} for {}x{} RGBA",
                self.data.len(),
                expected,
                self.width,
                self.height
            ))
            .into());
        }

        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| PipelineError::invalid_frame("buffer rejected by image decoder").into())
    }

    /// Validated image rotated upright
    pub fn to_oriented_image(&self) -> Result<RgbaImage> {
        Ok(self.orientation.apply(self.to_image()?))
    }
}
