//! # Error Types
//!
//! Custom error types for Ground Link using `thiserror`.
//!
//! Per-cycle failures (`Serial`, `MalformedFrame`, `NetworkDisconnect`) are
//! absorbed by the loop that produced them. Acquisition failures
//! (`Connection`, `RelayBind`, `DeviceUnavailable` at startup) end the
//! owning component.

use thiserror::Error;

/// Main error type for Ground Link
#[derive(Debug, Error)]
pub enum GroundLinkError {
    /// Input device vanished or could not be found
    #[error("Input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Serial port could not be opened
    #[error("Serial connection error: {0}")]
    Connection(String),

    /// Serial read/write failure on an open port
    #[error("Serial I/O error: {0}")]
    Serial(String),

    /// Inbound serial line could not be parsed
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Websocket connection to the relay dropped or was refused
    #[error("Relay connection lost: {0}")]
    NetworkDisconnect(String),

    /// Relay listening socket could not be bound
    #[error("Relay bind failed on {addr}: {source}")]
    RelayBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Relay lifecycle errors (runtime start, shutdown acknowledgement)
    #[error("Relay error: {0}")]
    Relay(String),

    /// Shared telemetry store errors
    #[error("Telemetry store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ground Link
pub type Result<T> = std::result::Result<T, GroundLinkError>;
