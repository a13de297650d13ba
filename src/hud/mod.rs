//! # HUD Module
//!
//! Attitude display: an artificial horizon with pitch/roll/yaw gauges.
//!
//! This module handles:
//! - Building a backend-neutral draw list per frame
//! - Stencil-clipped horizon, linear sliders and scrolling tapes
//! - Software rasterization with PPM snapshots
//! - Non-blocking attitude feeds from the relay or the telemetry store

pub mod canvas;
pub mod feed;
pub mod geometry;
pub mod horizon;
pub mod renderer;
pub mod scene;
pub mod slider;

pub use canvas::{ProceduralTextures, SoftwareCanvas, TextureSource};
pub use feed::{AttitudeFeed, FeedState, RelayFeed, StoreFeed};
pub use renderer::{run_hud_service, FpsMeter, HudLayout, HudRenderer};
pub use scene::{DrawCommand, HudFrame, Markers};
