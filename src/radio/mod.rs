//! # Radio Module
//!
//! Bridges the telemetry store to the radio transceiver.
//!
//! This module handles:
//! - The fixed-rate command/response cycle over the serial link
//! - Publishing received attitude into the store
//! - Forwarding attitude to the relay for remote displays

pub mod bridge;
pub mod publisher;

pub use bridge::{run_radio_service, BridgeStats, CycleOutcome, RadioBridge};
pub use publisher::RelayPublisher;
