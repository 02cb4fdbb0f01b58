//! Per-frame filters for the frame-processing export path.

use image::{imageops, RgbaImage};

use crate::export::FrameFilterSpec;

/// A filter applied independently to every decoded frame.
pub trait FrameFilter: Send + Sync {
    /// Filter one frame. The result has the same dimensions as the input.
    fn apply(&self, frame: &RgbaImage) -> RgbaImage;

    fn name(&self) -> &str;
}

/// Largest sigma accepted; beyond this a frame is a flat average anyway.
pub const MAX_BLUR_RADIUS: f64 = 512.0;

/// Gaussian blur cropped back to the frame extent.
///
/// The frame is padded with its clamped edge pixels before blurring, so the
/// borders blur toward their own color instead of toward transparent black.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianBlur {
    radius: f32,
}

impl GaussianBlur {
    pub fn new(radius: f64) -> Self {
        Self {
            radius: if radius.is_finite() {
                radius.clamp(0.0, MAX_BLUR_RADIUS) as f32
            } else {
                0.0
            },
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Pixels the kernel reaches past an edge.
    fn reach(&self) -> u32 {
        (self.radius * 3.0).ceil() as u32
    }
}

impl FrameFilter for GaussianBlur {
    fn apply(&self, frame: &RgbaImage) -> RgbaImage {
        let (width, height) = frame.dimensions();
        if self.radius <= 0.0 || width == 0 || height == 0 {
            return frame.clone();
        }

        let pad = self.reach();
        let Some(padded) = pad_with_edges(frame, pad) else {
            return frame.clone();
        };
        let blurred = imageops::blur(&padded, self.radius);
        imageops::crop_imm(&blurred, pad, pad, width, height).to_image()
    }

    fn name(&self) -> &str {
        "gaussian_blur"
    }
}

/// `None` when the padded size does not fit in `u32`.
fn pad_with_edges(frame: &RgbaImage, pad: u32) -> Option<RgbaImage> {
    let (width, height) = frame.dimensions();
    let border = pad.checked_mul(2)?;
    let padded_width = width.checked_add(border)?;
    let padded_height = height.checked_add(border)?;
    Some(RgbaImage::from_fn(padded_width, padded_height, |x, y| {
        let sx = x.saturating_sub(pad).min(width - 1);
        let sy = y.saturating_sub(pad).min(height - 1);
        *frame.get_pixel(sx, sy)
    }))
}

impl FrameFilterSpec {
    /// Instantiate the filter this spec describes.
    pub fn build(&self) -> Box<dyn FrameFilter> {
        match *self {
            FrameFilterSpec::GaussianBlur { radius } => Box::new(GaussianBlur::new(radius)),
        }
    }
}
