//! Draw list produced by the HUD renderer for one frame.

use super::geometry::{Affine2, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const RED: Rgba = Rgba::rgb(255, 0, 0);
    pub const GREEN: Rgba = Rgba::rgb(0, 255, 0);
    pub const CYAN: Rgba = Rgba::rgb(0, 255, 255);
    pub const GREY: Rgba = Rgba::rgb(153, 153, 153);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }
}

/// The three horizon textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureId {
    /// Sky/ground ball, translated by pitch and clipped to a disc.
    Interior,
    /// Bezel, rotated by roll.
    Frame,
    /// Static outer ring with the aircraft symbol.
    Ring,
}

/// Horizontal placement of a label relative to its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Rgba),
    ClearStencil,
    /// Set the stencil to 1 inside the polygon; color is not written.
    StencilWrite { polygon: Vec<Point> },
    /// Square `[-half_extent, half_extent]²` mapped through `transform`.
    TexturedQuad {
        texture: TextureId,
        transform: Affine2,
        half_extent: f32,
        /// Draw only where the stencil is 1.
        stencil_test: bool,
    },
    FillRect { min: Point, max: Point, color: Rgba },
    Line { from: Point, to: Point, color: Rgba },
    Label {
        pos: Point,
        text: String,
        color: Rgba,
        anchor: Anchor,
    },
}

/// Marker offsets from each instrument's center, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Markers {
    /// Vertical shift of the horizon interior.
    pub horizon_pitch: f32,
    /// Rotation of the horizon frame, degrees.
    pub horizon_roll: f32,
    pub pitch_slider: f32,
    pub roll_slider: f32,
    pub yaw_slider: f32,
}

/// One rendered frame.
#[derive(Debug, Clone, Default)]
pub struct HudFrame {
    pub commands: Vec<DrawCommand>,
    pub markers: Markers,
}

impl HudFrame {
    /// Text of every label, in draw order.
    pub fn label_texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCommand::Label { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}
