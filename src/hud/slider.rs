//! # Sliders and Tapes
//!
//! Two gauge styles:
//!
//! - [`LinearSlider`]: fixed scale from -100 to 100, a marker moves along it.
//!   `offset = clamp(value, -100, 100) · (length / 2) / 100`
//! - [`ScrollingTape`]: fixed center marker, the labeled scale scrolls with
//!   the value. Labels every 10 units, `length / 6` pixels apart; the
//!   visible set is regenerated each frame.
//!
//! Horizontal gauges hang below their anchor `y` and are centered on `x`.
//! Vertical gauges extend left of their anchor `x` and are centered on `y`.

use super::geometry::Point;
use super::scene::{Anchor, DrawCommand, Rgba};

/// Limit of the linear slider scale.
pub const SLIDER_RANGE: f32 = 100.0;

const MARKER_HALF: f32 = 5.0;
const TICK_LEN: f32 = 10.0;
const LABEL_GAP: f32 = 5.0;
const LABEL_HEIGHT: f32 = 16.0;
/// Tape values are pinned to this magnitude before labels are generated.
const TAPE_LIMIT: f32 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Readout color by sign: green above zero, red below, cyan at zero.
#[must_use]
pub fn readout_color(value: f32) -> Rgba {
    if value > 0.0 {
        Rgba::GREEN
    } else if value < 0.0 {
        Rgba::RED
    } else {
        Rgba::CYAN
    }
}

/// Gauge with a static scale and a moving marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSlider {
    anchor: Point,
    length: f32,
    thickness: f32,
    orientation: Orientation,
    tick_step: i32,
}

impl LinearSlider {
    /// Horizontal slider, ticks every 20.
    #[must_use]
    pub fn horizontal(anchor: Point, length: f32, thickness: f32) -> Self {
        Self {
            anchor,
            length,
            thickness,
            orientation: Orientation::Horizontal,
            tick_step: 20,
        }
    }

    /// Vertical slider, ticks every 10.
    #[must_use]
    pub fn vertical(anchor: Point, length: f32, thickness: f32) -> Self {
        Self {
            anchor,
            length,
            thickness,
            orientation: Orientation::Vertical,
            tick_step: 10,
        }
    }

    #[must_use]
    pub fn length(&self) -> f32 {
        self.length
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Pixel offset of the marker from the slider center.
    ///
    /// # Examples
    ///
    /// ```
    /// use ground_link::hud::geometry::Point;
    /// use ground_link::hud::slider::LinearSlider;
    ///
    /// let slider = LinearSlider::vertical(Point::new(0.0, 0.0), 300.0, 40.0);
    /// assert_eq!(slider.marker_offset(30.0), 45.0);
    /// assert_eq!(slider.marker_offset(250.0), 150.0);
    /// ```
    #[must_use]
    pub fn marker_offset(&self, value: f32) -> f32 {
        value.clamp(-SLIDER_RANGE, SLIDER_RANGE) * (self.length / 2.0) / SLIDER_RANGE
    }

    /// Appends the slider to `out` and returns the marker offset.
    pub fn draw(&self, value: f32, out: &mut Vec<DrawCommand>) -> f32 {
        let offset = self.marker_offset(value);
        let Point { x, y } = self.anchor;
        let (len, thick) = (self.length, self.thickness);
        let readout = format!("{:.2}", value.clamp(-SLIDER_RANGE, SLIDER_RANGE));

        match self.orientation {
            Orientation::Horizontal => {
                out.push(DrawCommand::FillRect {
                    min: Point::new(x - len / 2.0, y - thick),
                    max: Point::new(x + len / 2.0, y),
                    color: Rgba::GREY,
                });
                out.push(DrawCommand::FillRect {
                    min: Point::new(x + offset - MARKER_HALF, y - thick),
                    max: Point::new(x + offset + MARKER_HALF, y),
                    color: Rgba::RED,
                });
                for tick in (-100..=100).step_by(self.tick_step as usize) {
                    let px = x + tick as f32 * len / 200.0;
                    out.push(DrawCommand::Line {
                        from: Point::new(px, y - thick),
                        to: Point::new(px, y - thick + TICK_LEN),
                        color: Rgba::WHITE,
                    });
                    out.push(DrawCommand::Label {
                        pos: Point::new(px, y - thick - LABEL_GAP - LABEL_HEIGHT),
                        text: tick.to_string(),
                        color: Rgba::WHITE,
                        anchor: Anchor::Center,
                    });
                }
                out.push(DrawCommand::Label {
                    pos: Point::new(x, y + LABEL_GAP),
                    text: readout,
                    color: readout_color(value),
                    anchor: Anchor::Center,
                });
            }
            Orientation::Vertical => {
                out.push(DrawCommand::FillRect {
                    min: Point::new(x - thick, y - len / 2.0),
                    max: Point::new(x, y + len / 2.0),
                    color: Rgba::GREY,
                });
                out.push(DrawCommand::FillRect {
                    min: Point::new(x - thick, y + offset - MARKER_HALF),
                    max: Point::new(x, y + offset + MARKER_HALF),
                    color: Rgba::RED,
                });
                for tick in (-100..=100).step_by(self.tick_step as usize) {
                    let py = y + tick as f32 * len / 200.0;
                    out.push(DrawCommand::Line {
                        from: Point::new(x - thick, py),
                        to: Point::new(x - thick + TICK_LEN, py),
                        color: Rgba::WHITE,
                    });
                    out.push(DrawCommand::Label {
                        pos: Point::new(x - thick - LABEL_GAP, py),
                        text: tick.to_string(),
                        color: Rgba::WHITE,
                        anchor: Anchor::Right,
                    });
                }
                out.push(DrawCommand::Label {
                    pos: Point::new(x - thick / 2.0, y + len / 2.0 + LABEL_GAP),
                    text: readout,
                    color: readout_color(value),
                    anchor: Anchor::Center,
                });
            }
        }

        offset
    }
}

/// Gauge with a fixed center marker and a scrolling scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollingTape {
    anchor: Point,
    length: f32,
    thickness: f32,
    orientation: Orientation,
}

impl ScrollingTape {
    #[must_use]
    pub fn horizontal(anchor: Point, length: f32, thickness: f32) -> Self {
        Self {
            anchor,
            length,
            thickness,
            orientation: Orientation::Horizontal,
        }
    }

    #[must_use]
    pub fn vertical(anchor: Point, length: f32, thickness: f32) -> Self {
        Self {
            anchor,
            length,
            thickness,
            orientation: Orientation::Vertical,
        }
    }

    /// Pixels between adjacent labels (10 units apart).
    #[must_use]
    pub fn spacing(&self) -> f32 {
        self.length / 6.0
    }

    /// Labels in view for `value`, with their offset from the tape center.
    #[must_use]
    pub fn visible_ticks(&self, value: f32) -> Vec<(i32, f32)> {
        let value = value.clamp(-TAPE_LIMIT, TAPE_LIMIT);
        let spacing = self.spacing();
        let start = (((value - 2.5 * spacing) / 10.0).floor() as i32).saturating_mul(10);
        let end = (((value + 2.5 * spacing) / 10.0).floor() as i32).saturating_mul(10);
        let window = self.length / 2.0 + spacing;

        (start..=end)
            .step_by(10)
            .map(|tick| (tick, (tick as f32 - value) * spacing / 10.0))
            .filter(|&(_, offset)| offset.abs() < window)
            .collect()
    }

    /// Appends the tape to `out`.
    pub fn draw(&self, value: f32, out: &mut Vec<DrawCommand>) {
        let Point { x, y } = self.anchor;
        let (len, thick) = (self.length, self.thickness);

        match self.orientation {
            Orientation::Horizontal => {
                out.push(DrawCommand::FillRect {
                    min: Point::new(x - len / 2.0, y - thick),
                    max: Point::new(x + len / 2.0, y),
                    color: Rgba::GREY,
                });
                out.push(DrawCommand::FillRect {
                    min: Point::new(x - MARKER_HALF, y - thick),
                    max: Point::new(x + MARKER_HALF, y),
                    color: Rgba::RED,
                });
                for (tick, offset) in self.visible_ticks(value) {
                    out.push(DrawCommand::Line {
                        from: Point::new(x + offset, y - thick),
                        to: Point::new(x + offset, y - thick + TICK_LEN),
                        color: Rgba::WHITE,
                    });
                    out.push(DrawCommand::Label {
                        pos: Point::new(x + offset, y - thick - LABEL_GAP - LABEL_HEIGHT),
                        text: tick.to_string(),
                        color: Rgba::WHITE,
                        anchor: Anchor::Center,
                    });
                }
            }
            Orientation::Vertical => {
                out.push(DrawCommand::FillRect {
                    min: Point::new(x - thick, y - len / 2.0),
                    max: Point::new(x, y + len / 2.0),
                    color: Rgba::GREY,
                });
                out.push(DrawCommand::FillRect {
                    min: Point::new(x - thick, y - MARKER_HALF),
                    max: Point::new(x, y + MARKER_HALF),
                    color: Rgba::RED,
                });
                for (tick, offset) in self.visible_ticks(value) {
                    out.push(DrawCommand::Line {
                        from: Point::new(x - thick, y + offset),
                        to: Point::new(x - thick + TICK_LEN, y + offset),
                        color: Rgba::WHITE,
                    });
                    out.push(DrawCommand::Label {
                        pos: Point::new(x - thick - LABEL_GAP, y + offset),
                        text: tick.to_string(),
                        color: Rgba::WHITE,
                        anchor: Anchor::Right,
                    });
                }
            }
        }
    }
}
