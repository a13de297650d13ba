//! 2D points and affine transforms for the HUD draw list.
//!
//! Coordinates are in pixels with the origin at the bottom-left corner and
//! `y` pointing up. Transforms compose like a matrix stack: in `a * b`, `b`
//! is applied first.

use std::ops::Mul;

/// Number of segments of the horizon clip disc.
pub const DISC_SEGMENTS: usize = 360;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Affine map `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2 {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Default for Affine2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2 {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    #[must_use]
    pub fn translate(dx: f32, dy: f32) -> Self {
        Self {
            e: dx,
            f: dy,
            ..Self::IDENTITY
        }
    }

    #[must_use]
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Counter-clockwise rotation about the origin.
    #[must_use]
    pub fn rotate_deg(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }

    /// Inverse transform, `None` if the map is degenerate.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Self {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        })
    }
}

impl Mul for Affine2 {
    type Output = Affine2;

    fn mul(self, rhs: Affine2) -> Affine2 {
        Affine2 {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            e: self.a * rhs.e + self.c * rhs.f + self.e,
            f: self.b * rhs.e + self.d * rhs.f + self.f,
        }
    }
}

/// Regular polygon approximating a disc, one vertex per segment.
#[must_use]
pub fn disc_polygon(center: Point, radius: f32, segments: usize) -> Vec<Point> {
    (0..segments)
        .map(|i| {
            let angle = (i as f32 * 360.0 / segments as f32).to_radians();
            Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(p: Point, x: f32, y: f32) {
        assert!((p.x - x).abs() < 1e-3 && (p.y - y).abs() < 1e-3, "got {:?}, expected ({}, {})", p, x, y);
    }

    #[test]
    fn test_rotation_is_counter_clockwise() {
        let p = Affine2::rotate_deg(90.0).apply(Point::new(1.0, 0.0));
        assert_close(p, 0.0, 1.0);
    }

    #[test]
    fn test_composition_applies_right_first() {
        // translate(10, 0) after scale(2): (1, 1) -> (2, 2) -> (12, 2)
        let m = Affine2::translate(10.0, 0.0) * Affine2::scale(2.0, 2.0);
        assert_close(m.apply(Point::new(1.0, 1.0)), 12.0, 2.0);

        // scale(2) after translate(10, 0): (1, 1) -> (11, 1) -> (22, 2)
        let m = Affine2::scale(2.0, 2.0) * Affine2::translate(10.0, 0.0);
        assert_close(m.apply(Point::new(1.0, 1.0)), 22.0, 2.0);
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = Affine2::translate(300.0, 200.0) * Affine2::rotate_deg(20.0) * Affine2::scale(2.0, 2.0);
        let inv = m.inverse().unwrap();
        let p = Point::new(-42.0, 17.5);
        let back = inv.apply(m.apply(p));
        assert_close(back, p.x, p.y);
    }

    #[test]
    fn test_degenerate_has_no_inverse() {
        assert!(Affine2::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_disc_polygon() {
        let center = Point::new(100.0, 50.0);
        let disc = disc_polygon(center, 150.0, DISC_SEGMENTS);
        assert_eq!(disc.len(), 360);
        assert_close(disc[0], 250.0, 50.0);
        assert_close(disc[90], 100.0, 200.0);
        for p in disc {
            let r = ((p.x - center.x).powi(2) + (p.y - center.y).powi(2)).sqrt();
            assert!((r - 150.0).abs() < 1e-2);
        }
    }
}
