//! Aspect-fit / aspect-fill sizing and centering.

use serde::{Deserialize, Serialize};

use backdrop_media_model::{AffineTransform, Point, Size};

/// How a clip is sized into a bounding area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Fit entirely inside the area, leaving borders.
    AspectFit,
    /// Cover the area, cropping overflow.
    AspectFill,
}

/// Per-axis scale and integer-rounded centering offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryPlan {
    pub scale_x: f64,
    pub scale_y: f64,
    pub position_x: f64,
    pub position_y: f64,
}

impl GeometryPlan {
    pub fn scale_transform(&self) -> AffineTransform {
        AffineTransform::scale(self.scale_x, self.scale_y)
    }

    pub fn position(&self) -> Point {
        Point::new(self.position_x, self.position_y)
    }

    /// Size of `asset` after the plan's scale.
    pub fn scaled_size(&self, asset: Size) -> Size {
        Size::new(asset.width * self.scale_x, asset.height * self.scale_y)
    }
}

/// Aspect-fit size of `asset` inside `bounding`, shrunk by `scale`.
///
/// The height ratio is pre-multiplied by `scale` when picking the
/// constrained axis, and both result dimensions are multiplied by `scale`
/// afterwards.
pub fn aspect_fit_size(asset: Size, bounding: Size, scale: f64) -> Size {
    let mut size = bounding;
    let m_w = bounding.width / asset.width;
    let m_h = (bounding.height / asset.height) * scale;

    if m_h < m_w {
        size.width = bounding.height / asset.height * asset.width;
    } else if m_w < m_h {
        size.height = bounding.width / asset.width * asset.height;
    }

    size.width *= scale;
    size.height *= scale;
    size
}

/// Aspect-fill size of `asset` covering `bounding`.
///
/// Only the computed (overflowing) dimension is multiplied by `scale`; the
/// other dimension stays at the bounding size. This differs from
/// [`aspect_fit_size`], which scales both.
pub fn aspect_fill_size(asset: Size, bounding: Size, scale: f64) -> Size {
    let mut size = bounding;
    let m_w = bounding.width / asset.width;
    let m_h = bounding.height / asset.height;

    if m_h > m_w {
        size.width = (bounding.height / asset.height * asset.width) * scale;
    } else if m_w > m_h {
        size.height = (bounding.width / asset.width * asset.height) * scale;
    }

    size
}

/// Build the geometry plan for placing `asset` into `bounding`.
pub fn plan(asset: Size, bounding: Size, mode: FitMode, scale: f64) -> GeometryPlan {
    let result = match mode {
        FitMode::AspectFit => aspect_fit_size(asset, bounding, scale),
        FitMode::AspectFill => aspect_fill_size(asset, bounding, scale),
    };

    GeometryPlan {
        scale_x: result.width / asset.width,
        scale_y: result.height / asset.height,
        position_x: ((bounding.width - result.width) / 2.0).round(),
        position_y: ((bounding.height - result.height) / 2.0).round(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_landscape_into_wider_area() {
        let asset = Size::new(1920.0, 1080.0);
        let area = Size::new(1080.0, 720.0);
        let p = plan(asset, area, FitMode::AspectFill, 1.0);
        let scaled = p.scaled_size(asset);

        assert!((scaled.width - 1280.0).abs() < 1e-9);
        assert!((scaled.height - 720.0).abs() < 1e-9);
        assert_eq!(p.position_x, -100.0);
        assert_eq!(p.position_y, 0.0);
    }

    #[test]
    fn test_fit_with_half_scale_centers() {
        let asset = Size::new(1920.0, 1080.0);
        let area = Size::new(1080.0, 720.0);
        let p = plan(asset, area, FitMode::AspectFit, 0.5);
        let scaled = p.scaled_size(asset);

        // the pre-scaled height ratio selects the height-derived width
        assert!((scaled.width - 640.0).abs() < 1e-9);
        assert!((scaled.height - 360.0).abs() < 1e-9);
        assert_eq!(p.position_x, 220.0);
        assert_eq!(p.position_y, 180.0);
    }

    #[test]
    fn test_fill_scale_touches_only_computed_axis() {
        let asset = Size::new(1000.0, 1000.0);
        let area = Size::new(400.0, 200.0);
        let size = aspect_fill_size(asset, area, 0.5);
        // width ratio wins, height is the computed axis
        assert_eq!(size.width, 400.0);
        assert!((size.height - 200.0).abs() < 1e-9);

        let tall_area = Size::new(200.0, 400.0);
        let size = aspect_fill_size(asset, tall_area, 0.5);
        assert!((size.width - 200.0).abs() < 1e-9);
        assert_eq!(size.height, 400.0);
    }

    #[test]
    fn test_fit_scales_both_axes() {
        let asset = Size::new(100.0, 100.0);
        let area = Size::new(100.0, 100.0);
        let size = aspect_fit_size(asset, area, 0.25);
        assert_eq!(size, Size::new(25.0, 25.0));
    }

    #[test]
    fn test_matching_aspect_keeps_bounds() {
        let asset = Size::new(640.0, 360.0);
        let area = Size::new(1280.0, 720.0);
        let p = plan(asset, area, FitMode::AspectFill, 1.0);
        assert_eq!(p.scale_x, 2.0);
        assert_eq!(p.scale_y, 2.0);
        assert_eq!(p.position(), Point::ZERO);
    }

    #[test]
    fn test_plan_is_reproducible() {
        let asset = Size::new(1333.0, 777.0);
        let area = Size::new(1080.0, 1920.0);
        let a = plan(asset, area, FitMode::AspectFit, 0.6);
        let b = plan(asset, area, FitMode::AspectFit, 0.6);
        assert_eq!(a, b);
    }
}
