//! Orientation classification from a track's preferred transform.

use serde::{Deserialize, Serialize};

use backdrop_media_model::AffineTransform;

/// Effective upright direction of captured video content.
///
/// Names follow the camera convention the transforms come from: content
/// recorded with the device in its natural landscape position has an
/// identity transform and is `Right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Rotated 90°.
    Up,
    /// Rotated -90°.
    Down,
    /// Rotated 180°.
    Left,
    /// Not rotated.
    Right,
    /// Any other angle. Placed the same way as `Up`.
    Other,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Up => "up",
            Orientation::Down => "down",
            Orientation::Left => "left",
            Orientation::Right => "right",
            Orientation::Other => "other",
        }
    }
}

/// Classify a preferred transform by the angle of its linear part.
///
/// The angle is truncated to whole degrees before matching, so only exact
/// quarter turns map to `Up`/`Down`/`Left`/`Right`.
pub fn resolve_orientation(transform: &AffineTransform) -> Orientation {
    let degrees = transform.rotation_degrees();
    // Quarter turns built from sin/cos land a hair off the whole degree.
    let snapped = if (degrees - degrees.round()).abs() < 1e-9 {
        degrees.round()
    } else {
        degrees
    };

    match snapped.trunc() as i64 {
        0 => Orientation::Right,
        90 => Orientation::Up,
        180 => Orientation::Left,
        -90 => Orientation::Down,
        _ => Orientation::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backdrop_media_model::Size;

    #[test]
    fn test_canonical_angles() {
        let natural = Size::new(1920.0, 1080.0);
        let cases = [
            (0.0, Orientation::Right),
            (90.0, Orientation::Up),
            (180.0, Orientation::Left),
            (270.0, Orientation::Down),
        ];
        for (degrees, expected) in cases {
            let t = AffineTransform::from_display_rotation(degrees, natural);
            assert_eq!(resolve_orientation(&t), expected, "{degrees}°");
        }
    }

    #[test]
    fn test_rotation_matrices_with_float_noise() {
        for (degrees, expected) in [
            (90.0_f64, Orientation::Up),
            (-90.0, Orientation::Down),
            (180.0, Orientation::Left),
        ] {
            let t = AffineTransform::rotation(degrees.to_radians());
            assert_eq!(resolve_orientation(&t), expected, "{degrees}°");
        }
    }

    #[test]
    fn test_translation_does_not_affect_class() {
        let t = AffineTransform::new(1.0, 0.0, 0.0, 1.0, 320.0, -50.0);
        assert_eq!(resolve_orientation(&t), Orientation::Right);
    }

    #[test]
    fn test_off_axis_angles_fall_back() {
        for degrees in [45.0_f64, -45.0, 135.0, -135.0, 1.5, -170.0] {
            let t = AffineTransform::rotation(degrees.to_radians());
            assert_eq!(resolve_orientation(&t), Orientation::Other, "{degrees}°");
        }
    }

    #[test]
    fn test_scale_only_is_right() {
        let t = AffineTransform::scale(0.5, 2.0);
        assert_eq!(resolve_orientation(&t), Orientation::Right);
    }
}
