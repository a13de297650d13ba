//! # Artificial Horizon
//!
//! Draws the attitude ball from three square textures:
//!
//! 1. **Interior** (sky/ground) shifted vertically by pitch, drawn at 2×
//!    scale and clipped to a disc through the stencil buffer.
//! 2. **Frame** (bezel) rotated by roll about the horizon center.
//! 3. **Ring** with no transform beyond its placement.
//!
//! Pitch shift is `pitch · (radius / 100) · PITCH_GAIN` in interior texture
//! units, which the 2× scale doubles on screen.

use super::geometry::{disc_polygon, Affine2, Point, DISC_SEGMENTS};
use super::scene::{DrawCommand, TextureId};
use crate::telemetry::Attitude;

/// Pitch-to-offset tuning constant; negative so nose-up moves the ground down.
pub const PITCH_GAIN: f32 = -1.35;

/// Scale of the interior texture relative to the clip disc.
pub const INTERIOR_SCALE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtificialHorizon {
    center: Point,
    radius: f32,
}

impl ArtificialHorizon {
    #[must_use]
    pub fn new(center: Point, radius: f32) -> Self {
        Self { center, radius }
    }

    #[must_use]
    pub fn center(&self) -> Point {
        self.center
    }

    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Interior shift for `pitch` degrees, before the 2× scale.
    #[must_use]
    pub fn pitch_offset(&self, pitch: f32) -> f32 {
        pitch * (self.radius / 100.0) * PITCH_GAIN
    }

    #[must_use]
    pub fn interior_transform(&self, pitch: f32) -> Affine2 {
        Affine2::translate(self.center.x, self.center.y)
            * Affine2::scale(INTERIOR_SCALE, INTERIOR_SCALE)
            * Affine2::translate(0.0, self.pitch_offset(pitch))
    }

    #[must_use]
    pub fn frame_transform(&self, roll: f32) -> Affine2 {
        Affine2::translate(self.center.x, self.center.y) * Affine2::rotate_deg(roll)
    }

    #[must_use]
    pub fn ring_transform(&self) -> Affine2 {
        Affine2::translate(self.center.x, self.center.y)
    }

    /// Appends the horizon to `out`. Returns the interior pitch offset.
    pub fn draw(&self, attitude: &Attitude, out: &mut Vec<DrawCommand>) -> f32 {
        out.push(DrawCommand::ClearStencil);
        out.push(DrawCommand::StencilWrite {
            polygon: disc_polygon(self.center, self.radius, DISC_SEGMENTS),
        });
        out.push(DrawCommand::TexturedQuad {
            texture: TextureId::Interior,
            transform: self.interior_transform(attitude.pitch),
            half_extent: self.radius,
            stencil_test: true,
        });
        out.push(DrawCommand::TexturedQuad {
            texture: TextureId::Frame,
            transform: self.frame_transform(attitude.roll),
            half_extent: self.radius,
            stencil_test: false,
        });
        out.push(DrawCommand::TexturedQuad {
            texture: TextureId::Ring,
            transform: self.ring_transform(),
            half_extent: self.radius,
            stencil_test: false,
        });
        self.pitch_offset(attitude.pitch)
    }
}
