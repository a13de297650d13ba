//! # Controller Module
//!
//! Joystick input handling for the ground station.
//!
//! This module handles:
//! - Joystick detection and connection via evdev
//! - Translating axis, button and hat events into device-independent ids
//! - Low-pass filtering of axis readings
//! - Tick-batched publishing of the controls field-group

pub mod filter;
pub mod joystick;
pub mod mapper;
pub mod sampler;

pub use filter::AxisFilter;
pub use joystick::{EvdevJoystick, EventSource};
pub use mapper::{EventMapper, RawInputEvent};
pub use sampler::{run_joystick_service, JoystickSampler};
