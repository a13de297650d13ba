//! # Serial Frame Codec
//!
//! Line-oriented text framing between the ground station and the radio
//! transceiver.
//!
//! ## Frame Structure
//!
//! ```text
//! outbound: <command_prefix>:<a0>,<a1>,<a2>,<a3>,<a4>,<a5>;<buttons><terminator>
//! inbound:  <reply_prefix>:<pitch>,<roll>,<yaw>,<throttle>
//! setup:    PWR:<power_level><terminator>
//! ```
//!
//! Axes are written with 3 decimals, buttons as a lowercase hex bitmask where
//! bit `i` is button `i`. Inbound lines arrive without their newline (the
//! serial link strips it).

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::RadioConfig;
use crate::error::{GroundLinkError, Result};
use crate::telemetry::{Attitude, ControlInputs, NUM_AXES};

/// Prefix of the power-level setup frame.
pub const POWER_PREFIX: &str = "PWR";

/// One encoded outbound frame, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialFrame {
    bytes: Bytes,
    text_len: usize,
}

impl SerialFrame {
    /// Builds a frame from its text and line terminator.
    #[must_use]
    pub fn new(text: &str, terminator: &str) -> Self {
        let mut buf = BytesMut::with_capacity(text.len() + terminator.len());
        buf.put_slice(text.as_bytes());
        buf.put_slice(terminator.as_bytes());
        Self {
            bytes: buf.freeze(),
            text_len: text.len(),
        }
    }

    /// Bytes to put on the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The frame text without its terminator.
    #[must_use]
    pub fn text(&self) -> &str {
        // Built from a &str, so the prefix is valid UTF-8
        std::str::from_utf8(&self.bytes[..self.text_len]).unwrap_or_default()
    }
}

/// Encodes command frames and parses attitude replies.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    command_prefix: String,
    reply_prefix: String,
    terminator: String,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(&RadioConfig::default())
    }
}

impl FrameCodec {
    /// Creates a codec using the prefixes and terminator from `config`.
    #[must_use]
    pub fn new(config: &RadioConfig) -> Self {
        Self {
            command_prefix: config.command_prefix.clone(),
            reply_prefix: config.reply_prefix.clone(),
            terminator: config.terminator.clone(),
        }
    }

    /// Encodes the controls field-group into a command frame.
    ///
    /// # Examples
    ///
    /// ```
    /// use ground_link::serial::codec::FrameCodec;
    /// use ground_link::telemetry::ControlInputs;
    ///
    /// let mut controls = ControlInputs::default();
    /// controls.axes[0] = 0.5;
    /// controls.buttons[0] = true;
    /// controls.buttons[4] = true;
    ///
    /// let frame = FrameCodec::default().encode_controls(&controls);
    /// assert_eq!(frame.text(), "CMD:0.500,0.000,0.000,0.000,0.000,0.000;11");
    /// assert!(frame.as_bytes().ends_with(b"\r\n"));
    /// ```
    #[must_use]
    pub fn encode_controls(&self, controls: &ControlInputs) -> SerialFrame {
        let axes: Vec<String> = controls.axes.iter().map(|a| format!("{:.3}", a)).collect();
        let text = format!(
            "{}:{};{:x}",
            self.command_prefix,
            axes.join(","),
            controls.button_mask()
        );
        SerialFrame::new(&text, &self.terminator)
    }

    /// Encodes the power-level setup frame.
    #[must_use]
    pub fn encode_power(&self, level: u8) -> SerialFrame {
        SerialFrame::new(&format!("{}:{}", POWER_PREFIX, level), &self.terminator)
    }

    /// Formats an attitude reply line, as the transceiver would send it.
    #[must_use]
    pub fn encode_reply(&self, attitude: &Attitude) -> String {
        format!(
            "{}:{:.3},{:.3},{:.3},{:.3}",
            self.reply_prefix, attitude.pitch, attitude.roll, attitude.yaw, attitude.throttle
        )
    }

    /// Parses an attitude reply line.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` for a wrong prefix, a field count other than
    /// 4, or a non-finite or unparsable number.
    pub fn parse_reply(&self, line: &str) -> Result<Attitude> {
        let values = parse_values(line, &self.reply_prefix, 4)?;
        Ok(Attitude {
            pitch: values[0],
            roll: values[1],
            yaw: values[2],
            throttle: values[3],
        })
    }

    /// Parses a command line back into controls, as the transceiver would.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if the line is not a well-formed command.
    pub fn parse_command(&self, line: &str) -> Result<ControlInputs> {
        let (axes_part, mask_part) = line
            .split_once(';')
            .ok_or_else(|| malformed(line, "missing button mask"))?;
        let values = parse_values(axes_part, &self.command_prefix, NUM_AXES)?;
        let mask = u32::from_str_radix(mask_part.trim(), 16)
            .map_err(|_| malformed(line, "bad button mask"))?;

        let mut controls = ControlInputs::default();
        controls.axes.copy_from_slice(&values);
        controls.set_button_mask(mask);
        Ok(controls)
    }
}

fn malformed(line: &str, reason: &str) -> GroundLinkError {
    GroundLinkError::MalformedFrame(format!("{}: {:?}", reason, line))
}

/// Splits `<prefix>:<v0>,<v1>,...` into exactly `count` finite numbers.
fn parse_values(line: &str, prefix: &str, count: usize) -> Result<Vec<f32>> {
    let (head, body) = line
        .split_once(':')
        .ok_or_else(|| malformed(line, "missing ':'"))?;
    if head.trim() != prefix {
        return Err(malformed(line, "unexpected prefix"));
    }

    let values = body
        .split(',')
        .map(|field| field.trim().parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| malformed(line, "bad number"))?;

    if values.len() != count {
        return Err(malformed(line, "wrong field count"));
    }
    Ok(values)
}
