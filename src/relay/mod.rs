//! # Relay Module
//!
//! Websocket broadcast relay between the radio bridge and any number of
//! displays.
//!
//! This module handles:
//! - The relay server on its own thread with start/stop handshake
//! - Client helpers for publishing and subscribing
//! - The attitude message format

pub mod client;
pub mod message;
pub mod server;

pub use message::AttitudeMessage;
pub use server::{RelayHandle, RelayServer};
