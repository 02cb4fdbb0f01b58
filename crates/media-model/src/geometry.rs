//! Size and point types in pixel space.
//!
//! The origin is the top-left corner of a frame; `y` grows downward.

use serde::{Deserialize, Serialize};

use crate::transform::AffineTransform;

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Apply the linear part of a transform (translation is ignored).
    ///
    /// The result may have negative components when the transform rotates
    /// or flips; use [`Size::abs`] for an extent.
    pub fn applying(&self, t: &AffineTransform) -> Size {
        Size {
            width: t.a * self.width + t.c * self.height,
            height: t.b * self.width + t.d * self.height,
        }
    }

    /// Per-axis absolute value.
    pub fn abs(&self) -> Size {
        Size {
            width: self.width.abs(),
            height: self.height.abs(),
        }
    }

    /// Width divided by height, or `0.0` for a zero-height size.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0.0 {
            0.0
        } else {
            self.width / self.height
        }
    }

    /// Whether both dimensions are strictly positive and finite.
    pub fn is_renderable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// A 2D point in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
