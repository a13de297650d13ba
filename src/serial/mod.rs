//! # Serial Communication Module
//!
//! Line-framed serial link to the radio transceiver.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control), with port auto-discovery
//! - Writing encoded command frames
//! - Reading one reply line per call, bounded by the configured timeout
//! - Buffering partial lines across reads
//! - Skipping a reply backlog so callers see the newest line
//!
//! A timeout is an ordinary outcome ([`SerialReply::Timeout`]), not an error.

pub mod codec;

use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{GroundLinkError, Result};
use codec::SerialFrame;

pub use codec::FrameCodec;

/// Longest accepted line, newline excluded.
pub const MAX_LINE_LEN: usize = 256;

/// Port name that triggers auto-discovery.
pub const AUTO_PORT: &str = "auto";

/// Outcome of one [`SerialConnection::receive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialReply {
    /// A complete line, terminator stripped.
    Line(String),
    /// Nothing complete arrived within the timeout.
    Timeout,
}

/// Line-framed serial connection.
///
/// Generic over the underlying stream so tests can drive it through
/// in-memory pipes; production code uses [`tokio_serial::SerialStream`].
pub struct SerialConnection<T = tokio_serial::SerialStream> {
    port: Option<T>,
    device_path: String,
    timeout: Duration,
    buffer: BytesMut,
}

impl<T> std::fmt::Debug for SerialConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection")
            .field("device_path", &self.device_path)
            .field("timeout", &self.timeout)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialConnection<tokio_serial::SerialStream> {
    /// Open the configured serial port.
    ///
    /// With `port = "auto"` the first enumerated port is used.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if no port is found, the device path is missing
    /// or access is denied.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ground_link::config::SerialConfig;
    /// use ground_link::serial::SerialConnection;
    ///
    /// # async fn demo() -> ground_link::error::Result<()> {
    /// let serial = SerialConnection::open(&SerialConfig::default())?;
    /// println!("Connected to {}", serial.device_path());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let path = if config.port == AUTO_PORT {
            candidate_ports()?
                .into_iter()
                .next()
                .ok_or_else(|| GroundLinkError::Connection("no serial ports found".to_string()))?
        } else {
            config.port.clone()
        };

        debug!("Opening serial port {} at {} baud", path, config.baud_rate);
        let port = tokio_serial::new(&path, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| GroundLinkError::Connection(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened serial port {} at {} baud", path, config.baud_rate);
        Ok(Self::from_stream(
            port,
            path,
            Duration::from_millis(config.timeout_ms),
        ))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialConnection<T> {
    /// Wraps an already-open stream.
    pub fn from_stream(port: T, device_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            port: Some(port),
            device_path: device_path.into(),
            timeout,
            buffer: BytesMut::with_capacity(MAX_LINE_LEN * 2),
        }
    }

    /// Path of the opened device.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Receive timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the port is still open.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_mut(&mut self) -> Result<&mut T> {
        self.port
            .as_mut()
            .ok_or_else(|| GroundLinkError::Serial(format!("{} is closed", self.device_path)))
    }

    /// Write one frame, terminator included.
    ///
    /// # Errors
    ///
    /// Returns `Serial` if the write or flush fails, or the port is closed.
    pub async fn send(&mut self, frame: &SerialFrame) -> Result<()> {
        let port = self.port_mut()?;

        port.write_all(frame.as_bytes())
            .await
            .map_err(|e| GroundLinkError::Serial(format!("Failed to write frame: {}", e)))?;

        port.flush()
            .await
            .map_err(|e| GroundLinkError::Serial(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent: {}", frame.text());
        Ok(())
    }

    /// Wait up to the timeout for one complete line.
    ///
    /// Bytes of an unfinished line stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// - `MalformedFrame`: a line exceeded [`MAX_LINE_LEN`] or was not UTF-8
    /// - `Serial`: the read failed, the port reached end-of-stream or is closed
    pub async fn receive(&mut self) -> Result<SerialReply> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(line) = self.take_line()? {
                debug!("Received: {}", line);
                return Ok(SerialReply::Line(line));
            }

            if self.buffer.len() > MAX_LINE_LEN {
                let dropped = self.buffer.len();
                self.buffer.clear();
                return Err(GroundLinkError::MalformedFrame(format!(
                    "line exceeds {} bytes ({} bytes discarded)",
                    MAX_LINE_LEN, dropped
                )));
            }

            let Self { port, buffer, device_path, .. } = self;
            let port = port
                .as_mut()
                .ok_or_else(|| GroundLinkError::Serial(format!("{} is closed", device_path)))?;

            // read_buf is cancel-safe; partial data stays in the buffer
            match timeout_at(deadline, port.read_buf(buffer)).await {
                Err(_) => return Ok(SerialReply::Timeout),
                Ok(Ok(0)) => {
                    return Err(GroundLinkError::Serial(format!(
                        "{}: end of stream",
                        device_path
                    )))
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    return Err(GroundLinkError::Serial(format!("Failed to read: {}", e)))
                }
            }
        }
    }

    /// Like [`receive`](Self::receive), then discards every older line
    /// already waiting and returns the newest one.
    ///
    /// The count is the number of lines skipped, malformed ones included.
    /// Only data that is immediately readable is drained; this never waits
    /// beyond the first line.
    ///
    /// # Errors
    ///
    /// Same as [`receive`](Self::receive), for the first line only.
    pub async fn receive_latest(&mut self) -> Result<(SerialReply, usize)> {
        let SerialReply::Line(mut latest) = self.receive().await? else {
            return Ok((SerialReply::Timeout, 0));
        };

        let mut skipped = 0;
        loop {
            match self.take_line() {
                Ok(Some(line)) => {
                    latest = line;
                    skipped += 1;
                }
                Ok(None) => {
                    if self.buffer.len() > MAX_LINE_LEN || !self.read_ready().await {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Skipped queued line: {}", e);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            debug!("Received: {} ({} older lines skipped)", latest, skipped);
        }
        Ok((SerialReply::Line(latest), skipped))
    }

    /// Reads whatever the port has ready without waiting.
    async fn read_ready(&mut self) -> bool {
        let Self { port, buffer, .. } = self;
        let Some(port) = port.as_mut() else {
            return false;
        };
        matches!(timeout(Duration::ZERO, port.read_buf(buffer)).await, Ok(Ok(n)) if n > 0)
    }

    /// Pops one complete line from the buffer, if any.
    fn take_line(&mut self) -> Result<Option<String>> {
        let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };

        let mut line = self.buffer.split_to(newline);
        self.buffer.advance(1);

        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.len() > MAX_LINE_LEN {
            return Err(GroundLinkError::MalformedFrame(format!(
                "line exceeds {} bytes",
                MAX_LINE_LEN
            )));
        }

        String::from_utf8(line.to_vec())
            .map(Some)
            .map_err(|_| GroundLinkError::MalformedFrame("line is not valid UTF-8".to_string()))
    }

    /// Release the port. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.shutdown().await {
                warn!("Error while closing {}: {}", self.device_path, e);
            }
            self.buffer.clear();
            info!("Closed serial port {}", self.device_path);
        }
    }
}

/// Serial ports reported by the platform, in enumeration order.
///
/// # Errors
///
/// Returns `Connection` if enumeration itself fails.
pub fn candidate_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| GroundLinkError::Connection(format!("Failed to enumerate ports: {}", e)))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
