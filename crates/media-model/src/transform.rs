//! 2×3 affine transforms.
//!
//! Row-vector convention: a point `(x, y)` maps to
//! `(a·x + c·y + tx, b·x + d·y + ty)`. Concatenation is ordered:
//! `t1.concatenating(&t2)` applies `t1` first and `t2` second.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Size};

/// An affine transform `[a b; c d; tx ty]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Rotation by `radians`. Positive angles turn clockwise on screen
    /// because `y` grows downward.
    pub fn rotation(radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// The upright-correcting transform for a frame of `natural_size` whose
    /// container asks for a clockwise display rotation of `degrees`.
    ///
    /// Quarter turns produce exact matrices that also move the rotated frame
    /// back into the positive quadrant. Any other angle yields a plain
    /// rotation about the origin.
    pub fn from_display_rotation(degrees: f64, natural_size: Size) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let w = natural_size.width;
        let h = natural_size.height;
        if normalized == 0.0 {
            Self::IDENTITY
        } else if normalized == 90.0 {
            Self::new(0.0, 1.0, -1.0, 0.0, h, 0.0)
        } else if normalized == 180.0 {
            Self::new(-1.0, 0.0, 0.0, -1.0, w, h)
        } else if normalized == 270.0 {
            Self::new(0.0, -1.0, 1.0, 0.0, 0.0, w)
        } else {
            Self::rotation(normalized.to_radians())
        }
    }

    /// Returns `self` followed by `other`.
    pub fn concatenating(&self, other: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            tx: self.tx * other.a + self.ty * other.c + other.tx,
            ty: self.tx * other.b + self.ty * other.d + other.ty,
        }
    }

    pub fn apply_to_point(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.tx,
            y: self.b * p.x + self.d * p.y + self.ty,
        }
    }

    /// Rotation angle of the linear part in degrees, in `(-180, 180]`.
    pub fn rotation_degrees(&self) -> f64 {
        self.b.atan2(self.a).to_degrees()
    }

    /// Determinant of the linear part. Negative values indicate a mirror.
    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Axis-aligned bounding box `(min, max)` of a `size` frame after
    /// this transform.
    pub fn bounding_box(&self, size: Size) -> (Point, Point) {
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(size.width, 0.0),
            Point::new(0.0, size.height),
            Point::new(size.width, size.height),
        ]
        .map(|p| self.apply_to_point(p));

        let mut min = corners[0];
        let mut max = corners[0];
        for p in &corners[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
