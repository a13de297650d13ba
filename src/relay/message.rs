//! # Relay Messages
//!
//! JSON text frames carried over the relay.
//!
//! The relay itself forwards any text verbatim; only attitude messages have a
//! defined shape:
//!
//! ```json
//! {"type":"attitude","pitch":2.5,"roll":-10.0,"yaw":90.0,"throttle":0.4,"timestamp_ms":1700000000000}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::telemetry::Attitude;

/// `type` tag of attitude messages.
pub const ATTITUDE_TYPE: &str = "attitude";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttitudeMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    #[serde(default)]
    pub throttle: f32,
    #[serde(default)]
    pub timestamp_ms: i64,
}

impl AttitudeMessage {
    /// Wraps an attitude, stamped with the current wall-clock time.
    #[must_use]
    pub fn new(attitude: &Attitude) -> Self {
        Self {
            message_type: ATTITUDE_TYPE.to_string(),
            pitch: attitude.pitch,
            roll: attitude.roll,
            yaw: attitude.yaw,
            throttle: attitude.throttle,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn attitude(&self) -> Attitude {
        Attitude {
            pitch: self.pitch,
            roll: self.roll,
            yaw: self.yaw,
            throttle: self.throttle,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Extracts an attitude from a relay text frame.
    ///
    /// Returns `None` for frames that are not attitude messages, so foreign
    /// traffic on the relay is ignored rather than treated as an error.
    #[must_use]
    pub fn parse(text: &str) -> Option<Attitude> {
        serde_json::from_str::<AttitudeMessage>(text)
            .ok()
            .filter(|msg| msg.message_type == ATTITUDE_TYPE)
            .map(|msg| msg.attitude())
    }
}
