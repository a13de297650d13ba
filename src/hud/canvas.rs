//! # Software Canvas
//!
//! Rasterizes a [`HudFrame`] into an RGBA color buffer with an 8-bit stencil
//! buffer, mirroring the fixed-function pipeline the HUD was designed for:
//!
//! - `StencilWrite` fills a polygon (even-odd scanline) into the stencil only
//! - `TexturedQuad` samples a [`TextureSource`] through the inverse transform,
//!   optionally only where the stencil is 1, with source-over alpha blending
//! - `Label`s are recorded for a font-capable backend, not rasterized
//!
//! Rows are stored bottom-up (`y` points up); [`SoftwareCanvas::to_ppm`] flips
//! them into the usual top-down image order.

use std::ops::Range;
use std::path::Path;

use super::geometry::{Affine2, Point};
use super::scene::{Anchor, DrawCommand, HudFrame, Rgba, TextureId};
use crate::error::Result;

/// Supplies texels for the horizon textures.
pub trait TextureSource {
    /// Color at `u`, `v` in `0.0..=1.0`, with `v` pointing up.
    fn sample(&self, texture: TextureId, u: f32, v: f32) -> Rgba;
}

const SKY: Rgba = Rgba::rgb(58, 123, 213);
const GROUND: Rgba = Rgba::rgb(139, 90, 43);
const BEZEL: Rgba = Rgba::rgb(40, 40, 40);
const SYMBOL: Rgba = Rgba::rgb(255, 204, 0);

/// Built-in horizon artwork drawn from formulas.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProceduralTextures;

/// Distance from the texture center, 1.0 at the inscribed circle.
fn radial(u: f32, v: f32) -> f32 {
    2.0 * (u - 0.5).hypot(v - 0.5)
}

impl TextureSource for ProceduralTextures {
    fn sample(&self, texture: TextureId, u: f32, v: f32) -> Rgba {
        match texture {
            TextureId::Interior => {
                let dv = v - 0.5;
                if dv.abs() < 0.004 {
                    return Rgba::WHITE;
                }
                // Pitch ladder rungs
                let rung = (dv / 0.0625).round();
                if rung != 0.0 && (dv - rung * 0.0625).abs() < 0.002 && (u - 0.5).abs() < 0.06 {
                    return Rgba::WHITE;
                }
                if dv >= 0.0 {
                    SKY
                } else {
                    GROUND
                }
            }
            TextureId::Frame => {
                let d = radial(u, v);
                if d > 1.0 {
                    Rgba::TRANSPARENT
                } else if d >= 0.84 {
                    BEZEL
                } else if (0.86..=0.92).contains(&v) && (u - 0.5).abs() < (v - 0.86) * 0.5 {
                    // Roll pointer hanging from the bezel
                    Rgba::WHITE
                } else {
                    Rgba::TRANSPARENT
                }
            }
            TextureId::Ring => {
                let d = radial(u, v);
                let du = (u - 0.5).abs();
                if (0.97..=1.0).contains(&d) {
                    Rgba::WHITE
                } else if d < 0.03 || ((v - 0.5).abs() < 0.008 && (0.12..0.3).contains(&du)) {
                    SYMBOL
                } else {
                    Rgba::TRANSPARENT
                }
            }
        }
    }
}

/// A label the canvas could not rasterize itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLabel {
    pub pos: Point,
    pub text: String,
    pub color: Rgba,
    pub anchor: Anchor,
}

pub struct SoftwareCanvas {
    width: usize,
    height: usize,
    color: Vec<Rgba>,
    stencil: Vec<u8>,
    labels: Vec<RecordedLabel>,
}

impl std::fmt::Debug for SoftwareCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareCanvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("labels", &self.labels.len())
            .finish_non_exhaustive()
    }
}

/// Pixel indices covered by `lo..hi`, clipped to `0..limit`.
fn span(lo: f32, hi: f32, limit: usize) -> Range<usize> {
    let start = (lo.floor().max(0.0) as usize).min(limit);
    let end = (hi.ceil().max(0.0) as usize).min(limit);
    start..end.max(start)
}

impl SoftwareCanvas {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        Self {
            width,
            height,
            color: vec![Rgba::BLACK; width * height],
            stencil: vec![0; width * height],
            labels: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Color at column `x`, row `y` counted from the bottom.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        (x < self.width && y < self.height).then(|| self.color[y * self.width + x])
    }

    pub fn stencil_at(&self, x: usize, y: usize) -> Option<u8> {
        (x < self.width && y < self.height).then(|| self.stencil[y * self.width + x])
    }

    /// Labels of the last executed frame.
    pub fn labels(&self) -> &[RecordedLabel] {
        &self.labels
    }

    /// Rasterize every command of `frame` in order.
    pub fn execute<T: TextureSource + ?Sized>(&mut self, frame: &HudFrame, textures: &T) {
        self.labels.clear();
        for command in &frame.commands {
            match command {
                DrawCommand::Clear(color) => self.color.fill(*color),
                DrawCommand::ClearStencil => self.stencil.fill(0),
                DrawCommand::StencilWrite { polygon } => self.stencil_polygon(polygon),
                DrawCommand::TexturedQuad {
                    texture,
                    transform,
                    half_extent,
                    stencil_test,
                } => self.textured_quad(textures, *texture, transform, *half_extent, *stencil_test),
                DrawCommand::FillRect { min, max, color } => self.fill_rect(*min, *max, *color),
                DrawCommand::Line { from, to, color } => self.line(*from, *to, *color),
                DrawCommand::Label {
                    pos,
                    text,
                    color,
                    anchor,
                } => self.labels.push(RecordedLabel {
                    pos: *pos,
                    text: text.clone(),
                    color: *color,
                    anchor: *anchor,
                }),
            }
        }
    }

    fn blend(&mut self, index: usize, src: Rgba) {
        match src.a {
            0 => {}
            255 => self.color[index] = src,
            alpha => {
                let dst = self.color[index];
                let a = alpha as f32 / 255.0;
                let mix = |s: u8, d: u8| (s as f32 * a + d as f32 * (1.0 - a)).round() as u8;
                self.color[index] = Rgba {
                    r: mix(src.r, dst.r),
                    g: mix(src.g, dst.g),
                    b: mix(src.b, dst.b),
                    a: (alpha as f32 + dst.a as f32 * (1.0 - a)).round() as u8,
                };
            }
        }
    }

    fn stencil_polygon(&mut self, polygon: &[Point]) {
        if polygon.len() < 3 {
            return;
        }
        let (lo, hi) = polygon.iter().fold((f32::MAX, f32::MIN), |(lo, hi), p| {
            (lo.min(p.y), hi.max(p.y))
        });

        let mut crossings = Vec::new();
        for py in span(lo, hi, self.height) {
            let yc = py as f32 + 0.5;
            crossings.clear();
            for (i, a) in polygon.iter().enumerate() {
                let b = polygon[(i + 1) % polygon.len()];
                if (a.y <= yc && b.y > yc) || (b.y <= yc && a.y > yc) {
                    let t = (yc - a.y) / (b.y - a.y);
                    crossings.push(a.x + t * (b.x - a.x));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            for pair in crossings.chunks_exact(2) {
                // Pixel centers inside [pair[0], pair[1]]
                let first = (pair[0] - 0.5).ceil();
                let last = (pair[1] - 0.5).floor();
                if last < 0.0 || first > last {
                    continue;
                }
                let first = first.max(0.0) as usize;
                let last = (last as usize).min(self.width.saturating_sub(1));
                let row = py * self.width;
                for x in first..=last {
                    self.stencil[row + x] = 1;
                }
            }
        }
    }

    fn textured_quad<T: TextureSource + ?Sized>(
        &mut self,
        textures: &T,
        texture: TextureId,
        transform: &Affine2,
        half: f32,
        stencil_test: bool,
    ) {
        let Some(inverse) = transform.inverse() else {
            return;
        };
        if half <= 0.0 {
            return;
        }

        let corners = [(-half, -half), (half, -half), (half, half), (-half, half)]
            .map(|(x, y)| transform.apply(Point::new(x, y)));
        let (min_x, max_x, min_y, max_y) = corners.iter().fold(
            (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
            |(x0, x1, y0, y1), p| (x0.min(p.x), x1.max(p.x), y0.min(p.y), y1.max(p.y)),
        );

        for py in span(min_y, max_y, self.height) {
            for px in span(min_x, max_x, self.width) {
                let index = py * self.width + px;
                if stencil_test && self.stencil[index] != 1 {
                    continue;
                }
                let local = inverse.apply(Point::new(px as f32 + 0.5, py as f32 + 0.5));
                if local.x.abs() > half || local.y.abs() > half {
                    continue;
                }
                let u = (local.x + half) / (2.0 * half);
                let v = (local.y + half) / (2.0 * half);
                self.blend(index, textures.sample(texture, u, v));
            }
        }
    }

    fn fill_rect(&mut self, min: Point, max: Point, color: Rgba) {
        for py in span(min.y.round(), max.y.round(), self.height) {
            for px in span(min.x.round(), max.x.round(), self.width) {
                self.blend(py * self.width + px, color);
            }
        }
    }

    fn line(&mut self, from: Point, to: Point, color: Rgba) {
        let (dx, dy) = (to.x - from.x, to.y - from.y);
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let (x, y) = ((from.x + t * dx).floor(), (from.y + t * dy).floor());
            if x < 0.0 || y < 0.0 {
                continue;
            }
            let (x, y) = (x as usize, y as usize);
            if x < self.width && y < self.height {
                self.blend(y * self.width + x, color);
            }
        }
    }

    /// Binary PPM (P6) image of the color buffer, top row first.
    #[must_use]
    pub fn to_ppm(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.width, self.height);
        let mut out = Vec::with_capacity(header.len() + self.width * self.height * 3);
        out.extend_from_slice(header.as_bytes());
        for row in self.color.chunks_exact(self.width.max(1)).rev() {
            for px in row {
                out.extend_from_slice(&[px.r, px.g, px.b]);
            }
        }
        out
    }

    /// Write [`Self::to_ppm`] to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn write_ppm(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_ppm())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hud::geometry::disc_polygon;

    struct Solid(Rgba);

    impl TextureSource for Solid {
        fn sample(&self, _texture: TextureId, _u: f32, _v: f32) -> Rgba {
            self.0
        }
    }

    fn frame(commands: Vec<DrawCommand>) -> HudFrame {
        HudFrame {
            commands,
            ..HudFrame::default()
        }
    }

    fn clipped_interior(center: Point, radius: f32) -> Vec<DrawCommand> {
        vec![
            DrawCommand::Clear(Rgba::BLACK),
            DrawCommand::ClearStencil,
            DrawCommand::StencilWrite {
                polygon: disc_polygon(center, radius, 360),
            },
            DrawCommand::TexturedQuad {
                texture: TextureId::Interior,
                transform: Affine2::translate(center.x, center.y) * Affine2::scale(2.0, 2.0),
                half_extent: radius,
                stencil_test: true,
            },
        ]
    }

    #[test]
    fn test_stencil_clips_interior_to_disc() {
        let mut canvas = SoftwareCanvas::new(400, 400);
        canvas.execute(&frame(clipped_interior(Point::new(200.0, 200.0), 50.0)), &Solid(Rgba::RED));

        // Inside the disc
        assert_eq!(canvas.pixel(200, 200), Some(Rgba::RED));
        assert_eq!(canvas.pixel(200, 245), Some(Rgba::RED));
        // Inside the 2x quad but outside the disc
        assert_eq!(canvas.pixel(200, 260), Some(Rgba::BLACK));
        assert_eq!(canvas.pixel(240, 240), Some(Rgba::BLACK));
        assert_eq!(canvas.pixel(290, 200), Some(Rgba::BLACK));
    }

    #[test]
    fn test_stencil_write_leaves_color_alone() {
        let mut canvas = SoftwareCanvas::new(100, 100);
        canvas.execute(
            &frame(vec![
                DrawCommand::Clear(Rgba::WHITE),
                DrawCommand::StencilWrite {
                    polygon: disc_polygon(Point::new(50.0, 50.0), 20.0, 360),
                },
            ]),
            &Solid(Rgba::RED),
        );
        assert_eq!(canvas.stencil_at(50, 50), Some(1));
        assert_eq!(canvas.stencil_at(5, 5), Some(0));
        assert_eq!(canvas.pixel(50, 50), Some(Rgba::WHITE));
    }

    #[test]
    fn test_unclipped_quad_covers_its_square() {
        let mut canvas = SoftwareCanvas::new(100, 100);
        canvas.execute(
            &frame(vec![
                DrawCommand::Clear(Rgba::BLACK),
                DrawCommand::TexturedQuad {
                    texture: TextureId::Ring,
                    transform: Affine2::translate(50.0, 50.0),
                    half_extent: 10.0,
                    stencil_test: false,
                },
            ]),
            &Solid(Rgba::GREEN),
        );
        assert_eq!(canvas.pixel(41, 41), Some(Rgba::GREEN));
        assert_eq!(canvas.pixel(58, 58), Some(Rgba::GREEN));
        assert_eq!(canvas.pixel(61, 50), Some(Rgba::BLACK));
    }

    #[test]
    fn test_quad_partly_off_canvas() {
        let mut canvas = SoftwareCanvas::new(50, 50);
        canvas.execute(
            &frame(vec![DrawCommand::TexturedQuad {
                texture: TextureId::Frame,
                transform: Affine2::translate(-5.0, 45.0) * Affine2::rotate_deg(30.0),
                half_extent: 20.0,
                stencil_test: false,
            }]),
            &Solid(Rgba::RED),
        );
        assert_eq!(canvas.pixel(2, 45), Some(Rgba::RED));
    }

    #[test]
    fn test_transparent_texels_keep_background() {
        let mut canvas = SoftwareCanvas::new(20, 20);
        canvas.execute(
            &frame(vec![
                DrawCommand::Clear(Rgba::WHITE),
                DrawCommand::TexturedQuad {
                    texture: TextureId::Frame,
                    transform: Affine2::translate(10.0, 10.0),
                    half_extent: 10.0,
                    stencil_test: false,
                },
            ]),
            &Solid(Rgba::TRANSPARENT),
        );
        assert_eq!(canvas.pixel(10, 10), Some(Rgba::WHITE));
    }

    #[test]
    fn test_half_alpha_blends() {
        let mut canvas = SoftwareCanvas::new(4, 4);
        canvas.execute(
            &frame(vec![
                DrawCommand::Clear(Rgba::BLACK),
                DrawCommand::FillRect {
                    min: Point::new(0.0, 0.0),
                    max: Point::new(4.0, 4.0),
                    color: Rgba::new(255, 255, 255, 128),
                },
            ]),
            &Solid(Rgba::RED),
        );
        let px = canvas.pixel(1, 1).unwrap();
        assert!((127..=129).contains(&px.r));
    }

    #[test]
    fn test_rect_line_and_labels() {
        let mut canvas = SoftwareCanvas::new(100, 100);
        canvas.execute(
            &frame(vec![
                DrawCommand::Clear(Rgba::BLACK),
                DrawCommand::FillRect {
                    min: Point::new(10.0, 10.0),
                    max: Point::new(20.0, 15.0),
                    color: Rgba::GREY,
                },
                DrawCommand::Line {
                    from: Point::new(0.0, 40.0),
                    to: Point::new(100.0, 40.0),
                    color: Rgba::WHITE,
                },
                DrawCommand::Label {
                    pos: Point::new(5.0, 5.0),
                    text: "FPS: 30.00".to_string(),
                    color: Rgba::GREEN,
                    anchor: Anchor::Left,
                },
            ]),
            &Solid(Rgba::RED),
        );

        assert_eq!(canvas.pixel(10, 10), Some(Rgba::GREY));
        assert_eq!(canvas.pixel(19, 14), Some(Rgba::GREY));
        assert_eq!(canvas.pixel(20, 15), Some(Rgba::BLACK));
        assert_eq!(canvas.pixel(0, 40), Some(Rgba::WHITE));
        assert_eq!(canvas.pixel(99, 40), Some(Rgba::WHITE));
        assert_eq!(canvas.labels().len(), 1);
        assert_eq!(canvas.labels()[0].text, "FPS: 30.00");
    }

    #[test]
    fn test_ppm_is_top_down() {
        let mut canvas = SoftwareCanvas::new(3, 2);
        canvas.execute(
            &frame(vec![
                DrawCommand::Clear(Rgba::BLACK),
                DrawCommand::FillRect {
                    min: Point::new(0.0, 0.0),
                    max: Point::new(1.0, 1.0),
                    color: Rgba::RED,
                },
            ]),
            &Solid(Rgba::RED),
        );

        let ppm = canvas.to_ppm();
        let header = b"P6\n3 2\n255\n";
        assert!(ppm.starts_with(header));
        let pixels = &ppm[header.len()..];
        assert_eq!(pixels.len(), 3 * 2 * 3);
        // Bottom-left pixel lands at the start of the last row
        assert_eq!(&pixels[9..12], &[255, 0, 0]);
        assert_eq!(&pixels[0..3], &[0, 0, 0]);
    }

    #[test]
    fn test_write_ppm() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hud.ppm");
        SoftwareCanvas::new(8, 8).write_ppm(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), b"P6\n8 8\n255\n".len() + 8 * 8 * 3);
    }

    #[test]
    fn test_procedural_textures() {
        let t = ProceduralTextures;
        assert_eq!(t.sample(TextureId::Interior, 0.2, 0.9), SKY);
        assert_eq!(t.sample(TextureId::Interior, 0.2, 0.1), GROUND);
        assert_eq!(t.sample(TextureId::Interior, 0.2, 0.5), Rgba::WHITE);

        assert_eq!(t.sample(TextureId::Frame, 0.5, 0.5), Rgba::TRANSPARENT);
        assert_eq!(t.sample(TextureId::Frame, 0.5, 0.04), BEZEL);
        assert_eq!(t.sample(TextureId::Frame, 0.0, 0.0), Rgba::TRANSPARENT);

        assert_eq!(t.sample(TextureId::Ring, 0.5, 0.5), SYMBOL);
        assert_eq!(t.sample(TextureId::Ring, 0.5, 0.995), Rgba::WHITE);
        assert_eq!(t.sample(TextureId::Ring, 0.3, 0.7), Rgba::TRANSPARENT);
    }
}
