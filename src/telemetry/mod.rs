//! # Telemetry Module
//!
//! Snapshot data model and the store that hands it between processes.
//!
//! This module handles:
//! - The snapshot shape (6 axes, 17 buttons, optional attitude)
//! - Field-group ownership (controls vs. attitude)
//! - The lock-guarded latest-value store

pub mod snapshot;
pub mod store;

pub use snapshot::{
    Attitude, AxisSample, ControlInputs, FieldGroup, TelemetrySnapshot, NUM_AXES, NUM_BUTTONS,
};
pub use store::{MemoryStore, SharedFileStore, TelemetryStore};
