//! # Ground Link Library
//!
//! Fly a radio-controlled aircraft from a USB joystick and watch its attitude
//! on a live artificial-horizon HUD.
//!
//! The pipeline runs as independent processes that meet at a shared telemetry
//! store and a websocket relay:
//!
//! ```text
//! joystick -> store -> radio bridge <-> serial transceiver
//!                          |
//!                          v
//!                        relay -> HUD
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod hud;
pub mod radio;
pub mod relay;
pub mod serial;
pub mod telemetry;
