//! Unit-square geometry shared by the locator, recognizers and matchers
//!
//! Everything downstream of ingestion works in top-left origin coordinates
//! (y grows downward). Engines that report bottom-left boxes are converted
//! exactly once through [`NormalizedRect::to_top_left_origin`].

use serde::{Deserialize, Serialize};

/// Vertical origin convention of a coordinate source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    TopLeft,
    BottomLeft,
}

/// Rectangle in unit-square coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from a YOLO-style center box
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width * 0.5, cy - height * 0.5, width, height)
    }

    /// Build from a pixel box inside an image of the given size
    pub fn from_pixels(bounds: (u32, u32, u32, u32), img_width: u32, img_height: u32) -> Self {
        if img_width == 0 || img_height == 0 {
            return Self::default();
        }
        let (x, y, w, h) = bounds;
        Self::new(
            x as f32 / img_width as f32,
            y as f32 / img_height as f32,
            w as f32 / img_width as f32,
            h as f32 / img_height as f32,
        )
    }

    /// Convert a rect reported in `origin` convention to top-left origin
    pub fn to_top_left_origin(self, origin: Origin) -> Self {
        match origin {
            Origin::TopLeft => self,
            Origin::BottomLeft => Self::new(self.x, 1.0 - self.y - self.height, self.width, self.height),
        }
    }

    pub fn min_x(&self) -> f32 {
        self.x
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn min_y(&self) -> f32 {
        self.y
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    /// Whether this rect lies entirely below `other` (top-left origin)
    pub fn is_below(&self, other: &NormalizedRect) -> bool {
        self.min_y() > other.max_y()
    }

    /// Whether the horizontal extents intersect
    pub fn overlaps_x(&self, other: &NormalizedRect) -> bool {
        self.max_x() > other.min_x() && self.min_x() < other.max_x()
    }

    /// Clamp into the unit square
    pub fn clamped(&self) -> Self {
        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        let max_x = self.max_x().clamp(0.0, 1.0);
        let max_y = self.max_y().clamp(0.0, 1.0);
        Self::new(x, y, (max_x - x).max(0.0), (max_y - y).max(0.0))
    }

    /// Pixel rectangle against an image of the given dimensions
    pub fn to_pixels(&self, img_width: u32, img_height: u32) -> PixelRect {
        let r = self.clamped();
        let x0 = (r.min_x() * img_width as f32).round() as u32;
        let y0 = (r.min_y() * img_height as f32).round() as u32;
        let x1 = ((r.max_x() * img_width as f32).round() as u32).min(img_width);
        let y1 = ((r.max_y() * img_height as f32).round() as u32).min(img_height);
        PixelRect {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }
}

/// Rectangle in pixel coordinates (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
