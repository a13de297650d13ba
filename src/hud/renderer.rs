//! # HUD Renderer
//!
//! Builds one [`HudFrame`] per tick from the latest [`FeedState`] and paces
//! the render loop to the configured frame rate.
//!
//! Layout (pixels, origin bottom-left, for a `w × h` window):
//!
//! | Element         | Anchor                          | Size      |
//! |-----------------|---------------------------------|-----------|
//! | Horizon         | `(w/2 - 200, 0.2h + 30)`        | radius r  |
//! | Pitch slider    | `(0.75w, 0.2h)`, vertical       | 300 × 40  |
//! | Roll slider     | `(0.6w, 0.15h)`, horizontal     | 300 × 40  |
//! | Yaw slider      | `(0.6w, 0.25h)`, horizontal     | 300 × 40  |
//! | Pitch tape      | left of the horizon             | 20 × 240  |
//! | Yaw tape        | below the horizon               | 240 × 20  |
//!
//! A missing attitude renders as level flight with a `NO DATA` label; a lost
//! feed keeps rendering the last attitude it delivered.

use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::canvas::{ProceduralTextures, SoftwareCanvas};
use super::feed::{AttitudeFeed, FeedState};
use super::geometry::Point;
use super::horizon::ArtificialHorizon;
use super::scene::{Anchor, DrawCommand, HudFrame, Markers, Rgba};
use super::slider::{LinearSlider, ScrollingTape};
use crate::config::HudConfig;
use crate::error::Result;

const SLIDER_LENGTH: f32 = 300.0;
const SLIDER_THICKNESS: f32 = 40.0;
const TAPE_LENGTH: f32 = 240.0;
const TAPE_THICKNESS: f32 = 20.0;
const TAPE_GAP: f32 = 30.0;

/// Instrument placement for one window size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudLayout {
    pub width: f32,
    pub height: f32,
    pub horizon: ArtificialHorizon,
    pub pitch_slider: LinearSlider,
    pub roll_slider: LinearSlider,
    pub yaw_slider: LinearSlider,
    pub pitch_tape: ScrollingTape,
    pub yaw_tape: ScrollingTape,
}

impl HudLayout {
    #[must_use]
    pub fn new(width: u32, height: u32, radius: f32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let center = Point::new(w / 2.0 - 200.0, 0.2 * h + 30.0);

        Self {
            width: w,
            height: h,
            horizon: ArtificialHorizon::new(center, radius),
            pitch_slider: LinearSlider::vertical(
                Point::new(0.75 * w, 0.2 * h),
                SLIDER_LENGTH,
                SLIDER_THICKNESS,
            ),
            roll_slider: LinearSlider::horizontal(
                Point::new(0.6 * w, 0.15 * h),
                SLIDER_LENGTH,
                SLIDER_THICKNESS,
            ),
            yaw_slider: LinearSlider::horizontal(
                Point::new(0.6 * w, 0.25 * h),
                SLIDER_LENGTH,
                SLIDER_THICKNESS,
            ),
            pitch_tape: ScrollingTape::vertical(
                Point::new(center.x - radius - TAPE_GAP, center.y),
                TAPE_LENGTH,
                TAPE_THICKNESS,
            ),
            yaw_tape: ScrollingTape::horizontal(
                Point::new(center.x, center.y - radius - TAPE_GAP),
                TAPE_LENGTH,
                TAPE_THICKNESS,
            ),
        }
    }
}

/// Frames per second over a rolling one-second window.
#[derive(Debug, Clone, Copy)]
pub struct FpsMeter {
    window_start: Instant,
    frames: u32,
    fps: f32,
}

impl FpsMeter {
    const WINDOW: Duration = Duration::from_secs(1);

    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count a frame at `now`; returns the rate of the last full window.
    pub fn tick(&mut self, now: Instant) -> f32 {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Self::WINDOW {
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Turns feed state into draw lists.
#[derive(Debug, Clone, Copy)]
pub struct HudRenderer {
    layout: HudLayout,
}

impl HudRenderer {
    #[must_use]
    pub fn new(config: &HudConfig) -> Self {
        Self {
            layout: HudLayout::new(config.width, config.height, config.horizon_radius),
        }
    }

    pub fn layout(&self) -> &HudLayout {
        &self.layout
    }

    /// Build the draw list for one frame.
    ///
    /// # Arguments
    ///
    /// * `state` - Latest feed state; `None` attitude draws level flight
    /// * `source` - Feed name for the status line
    /// * `fps` - Measured frame rate to display
    #[must_use]
    pub fn render_frame(&self, state: &FeedState, source: &str, fps: f32) -> HudFrame {
        let layout = &self.layout;
        let (w, h) = (layout.width, layout.height);
        let attitude = state.attitude.unwrap_or_default();
        let mut commands = vec![DrawCommand::Clear(Rgba::BLACK)];

        let horizon_pitch = layout.horizon.draw(&attitude, &mut commands);
        layout.pitch_tape.draw(attitude.pitch, &mut commands);
        layout.yaw_tape.draw(attitude.yaw, &mut commands);

        let pitch_slider = layout.pitch_slider.draw(attitude.pitch, &mut commands);
        let roll_slider = layout.roll_slider.draw(attitude.roll, &mut commands);
        let yaw_slider = layout.yaw_slider.draw(attitude.yaw, &mut commands);

        commands.push(DrawCommand::Line {
            from: Point::new(0.0, 0.4 * h),
            to: Point::new(w, 0.4 * h),
            color: Rgba::GREY,
        });
        commands.push(DrawCommand::Line {
            from: Point::new(0.2 * w, 0.0),
            to: Point::new(0.2 * w, 0.4 * h),
            color: Rgba::GREY,
        });

        let (status, status_color) = if state.connected {
            ("OK", Rgba::GREEN)
        } else {
            ("ERROR", Rgba::RED)
        };
        commands.push(DrawCommand::Label {
            pos: Point::new(20.0, 0.35 * h + 37.0),
            text: format!("{}: {}", source.to_uppercase(), status),
            color: status_color,
            anchor: Anchor::Left,
        });
        if state.attitude.is_none() {
            commands.push(DrawCommand::Label {
                pos: Point::new(20.0, 0.35 * h),
                text: "NO DATA".to_string(),
                color: Rgba::RED,
                anchor: Anchor::Left,
            });
        }
        commands.push(DrawCommand::Label {
            pos: Point::new(10.0, h - 20.0),
            text: format!("FPS: {:.2}", fps),
            color: Rgba::CYAN,
            anchor: Anchor::Left,
        });

        HudFrame {
            commands,
            markers: Markers {
                horizon_pitch,
                horizon_roll: attitude.roll,
                pitch_slider,
                roll_slider,
                yaw_slider,
            },
        }
    }
}

/// Render loop for the `hud` role. Returns the number of frames rendered.
///
/// Frames are built every tick; the software canvas only rasterizes when a
/// PPM snapshot is due.
///
/// # Errors
///
/// Never fails on feed or snapshot trouble; those are logged and the loop
/// keeps rendering.
pub async fn run_hud_service(
    config: &HudConfig,
    mut feed: Box<dyn AttitudeFeed>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64> {
    let renderer = HudRenderer::new(config);
    let mut canvas = (!config.snapshot_path.is_empty())
        .then(|| SoftwareCanvas::new(config.width, config.height));
    let snapshot_every = Duration::from_millis(config.snapshot_interval_ms);
    let mut next_snapshot = Instant::now();

    let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(config.fps.max(1))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut meter = FpsMeter::new(Instant::now());
    let mut frames: u64 = 0;

    info!(
        "HUD rendering {}x{} at {} fps from {}",
        config.width,
        config.height,
        config.fps,
        feed.source_name()
    );

    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let fps = meter.tick(now);
        let state = feed.latest();
        let frame = renderer.render_frame(&state, feed.source_name(), fps);
        frames += 1;
        debug!(
            "Frame {}: pitch marker {:.1}, connected {}",
            frames, frame.markers.pitch_slider, state.connected
        );

        if let Some(canvas) = canvas.as_mut() {
            if now >= next_snapshot {
                canvas.execute(&frame, &ProceduralTextures);
                if let Err(e) = canvas.write_ppm(Path::new(&config.snapshot_path)) {
                    warn!("HUD snapshot to {} failed: {}", config.snapshot_path, e);
                }
                next_snapshot = now + snapshot_every;
            }
        }
    }

    info!("HUD stopped after {} frames", frames);
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hud::feed::StoreFeed;
    use crate::telemetry::{Attitude, FieldGroup, MemoryStore, TelemetryStore};

    fn renderer() -> HudRenderer {
        HudRenderer::new(&HudConfig::default())
    }

    fn connected(attitude: Attitude) -> FeedState {
        FeedState {
            attitude: Some(attitude),
            connected: true,
        }
    }

    fn labels(frame: &HudFrame) -> Vec<String> {
        frame.label_texts().map(str::to_string).collect()
    }

    #[test]
    fn test_default_layout() {
        let layout = *renderer().layout();
        assert_eq!(layout.horizon.center(), Point::new(760.0, 270.0));
        assert_eq!(layout.horizon.radius(), 150.0);
        assert_eq!(layout.pitch_slider.length(), 300.0);
    }

    #[test]
    fn test_pitch_marker_independent_of_roll_and_yaw() {
        let r = renderer();
        let a = r.render_frame(&connected(Attitude::new(30.0, 20.0, 45.0)), "relay", 30.0);
        let b = r.render_frame(&connected(Attitude::new(30.0, -80.0, 300.0)), "relay", 30.0);

        assert_eq!(a.markers.pitch_slider, 45.0);
        assert_eq!(a.markers.pitch_slider, b.markers.pitch_slider);
        assert_eq!(a.markers.horizon_pitch, b.markers.horizon_pitch);
        assert_ne!(a.markers.roll_slider, b.markers.roll_slider);
    }

    #[test]
    fn test_pitch_marker_proportional() {
        let r = renderer();
        let m10 = r
            .render_frame(&connected(Attitude::new(10.0, 0.0, 0.0)), "relay", 0.0)
            .markers;
        let m30 = r
            .render_frame(&connected(Attitude::new(30.0, 0.0, 0.0)), "relay", 0.0)
            .markers;
        assert!((m30.pitch_slider - 3.0 * m10.pitch_slider).abs() < 1e-4);
        assert!((m30.horizon_pitch - 3.0 * m10.horizon_pitch).abs() < 1e-4);
    }

    #[test]
    fn test_frame_starts_with_clear() {
        let frame = renderer().render_frame(&FeedState::default(), "relay", 0.0);
        assert_eq!(frame.commands[0], DrawCommand::Clear(Rgba::BLACK));
        assert!(matches!(frame.commands[1], DrawCommand::ClearStencil));
    }

    #[test]
    fn test_no_data_renders_level() {
        let frame = renderer().render_frame(&FeedState::default(), "relay", 0.0);
        assert_eq!(frame.markers, Markers::default());

        let texts = labels(&frame);
        assert!(texts.contains(&"NO DATA".to_string()));
        assert!(texts.contains(&"RELAY: ERROR".to_string()));
    }

    #[test]
    fn test_stale_attitude_on_disconnect() {
        let state = FeedState {
            attitude: Some(Attitude::new(30.0, 15.0, 0.0)),
            connected: false,
        };
        let frame = renderer().render_frame(&state, "store", 29.7);

        assert_eq!(frame.markers.pitch_slider, 45.0);
        assert_eq!(frame.markers.horizon_roll, 15.0);
        let texts = labels(&frame);
        assert!(texts.contains(&"STORE: ERROR".to_string()));
        assert!(texts.contains(&"FPS: 29.70".to_string()));
        assert!(!texts.contains(&"NO DATA".to_string()));
    }

    #[test]
    fn test_huge_reply_values_still_render() {
        let attitude = crate::serial::FrameCodec::default()
            .parse_reply("ATT:0,0,1e12,0")
            .unwrap();
        let frame = renderer().render_frame(&connected(attitude), "relay", 0.0);

        assert_eq!(frame.commands[0], DrawCommand::Clear(Rgba::BLACK));
        assert!(labels(&frame).contains(&"1000000".to_string()));
        assert!(labels(&frame).contains(&"RELAY: OK".to_string()));
    }

    #[test]
    fn test_connected_status() {
        let frame = renderer().render_frame(&connected(Attitude::default()), "relay", 0.0);
        assert!(labels(&frame).contains(&"RELAY: OK".to_string()));
    }

    #[test]
    fn test_fps_meter() {
        let start = Instant::now();
        let mut meter = FpsMeter::new(start);
        for i in 1..30 {
            assert_eq!(meter.tick(start + Duration::from_millis(i * 33)), 0.0);
        }
        let fps = meter.tick(start + Duration::from_millis(1000));
        assert!((fps - 30.0).abs() < 1e-3);
        assert_eq!(meter.fps(), fps);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hud_service_renders_and_snapshots() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hud.ppm");
        let config = HudConfig {
            fps: 30,
            width: 320,
            height: 240,
            horizon_radius: 40.0,
            snapshot_path: path.to_string_lossy().into_owned(),
            snapshot_interval_ms: 100,
            ..HudConfig::default()
        };

        let store = MemoryStore::new();
        store
            .write(FieldGroup::Attitude(Attitude::new(10.0, 5.0, 90.0)))
            .unwrap();
        let (tx, shutdown) = watch::channel(false);

        let service = tokio::spawn(async move {
            run_hud_service(&config, Box::new(StoreFeed::new(store)), shutdown).await
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();

        let frames = service.await.unwrap().unwrap();
        assert!((14..=17).contains(&frames), "rendered {} frames", frames);

        let ppm = std::fs::read(&path).unwrap();
        assert!(ppm.starts_with(b"P6\n320 240\n255\n"));
    }

    #[tokio::test]
    async fn test_hud_service_exits_when_already_shutdown() {
        let (_tx, shutdown) = watch::channel(true);
        let frames = run_hud_service(
            &HudConfig::default(),
            Box::new(StoreFeed::new(MemoryStore::new())),
            shutdown,
        )
        .await
        .unwrap();
        assert_eq!(frames, 0);
    }
}
