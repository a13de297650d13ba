//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field has a default, so an empty file (or no file
//! at all, via [`Config::default`]) yields a runnable configuration. Each
//! component receives only its own section in its constructor.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{GroundLinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub joystick: JoystickConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub hud: HudConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Joystick sampling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct JoystickConfig {
    /// Explicit evdev path; empty means auto-detect.
    #[serde(default)]
    pub device_path: String,

    /// Which joystick to pick among auto-detected devices.
    #[serde(default)]
    pub joystick_index: usize,

    #[serde(default = "default_filter_threshold")]
    pub filter_threshold: f32,

    #[serde(default = "default_filter_factor")]
    pub filter_factor: f32,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_axis_raw_min")]
    pub axis_raw_min: i32,

    #[serde(default = "default_axis_raw_max")]
    pub axis_raw_max: i32,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path, or `"auto"` to take the first enumerated port.
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Transmitter power level sent once after the port opens.
    #[serde(default = "default_power_level")]
    pub power_level: Option<u8>,
}

/// Radio bridge configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    #[serde(default = "default_reply_prefix")]
    pub reply_prefix: String,

    #[serde(default = "default_terminator")]
    pub terminator: String,

    #[serde(default = "default_forward_to_relay")]
    pub forward_to_relay: bool,

    #[serde(default = "default_stats_interval_cycles")]
    pub stats_interval_cycles: u64,
}

/// Websocket relay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,

    #[serde(default = "default_relay_port")]
    pub port: u16,

    #[serde(default = "default_relay_path")]
    pub path: String,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Client-side delay between reconnect attempts.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Where the HUD takes its attitude from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    Relay,
    Store,
}

/// HUD renderer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HudConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_feed_source")]
    pub source: FeedSource,

    #[serde(default = "default_horizon_radius")]
    pub horizon_radius: f32,

    /// PPM snapshot of the canvas; empty disables snapshots.
    #[serde(default)]
    pub snapshot_path: String,

    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

/// Shared telemetry store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daily-rolling log directory; empty logs to stdout only.
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_filter_threshold() -> f32 { 0.05 }
fn default_filter_factor() -> f32 { 0.9 }
fn default_tick_ms() -> u64 { 10 }
fn default_reconnect_interval_ms() -> u64 { 1000 }
fn default_axis_raw_min() -> i32 { 0 }
fn default_axis_raw_max() -> i32 { 255 }

fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_timeout_ms() -> u64 { 1000 }
fn default_power_level() -> Option<u8> { Some(23) }

fn default_cycle_ms() -> u64 { 50 }
fn default_command_prefix() -> String { "CMD".to_string() }
fn default_reply_prefix() -> String { "ATT".to_string() }
fn default_terminator() -> String { "\r\n".to_string() }
fn default_forward_to_relay() -> bool { true }
fn default_stats_interval_cycles() -> u64 { 200 }

fn default_relay_host() -> String { "127.0.0.1".to_string() }
fn default_relay_port() -> u16 { 8765 }
fn default_relay_path() -> String { "/client".to_string() }
fn default_shutdown_grace_ms() -> u64 { 2000 }
fn default_channel_capacity() -> usize { 64 }

fn default_fps() -> u32 { 30 }
fn default_width() -> u32 { 1920 }
fn default_height() -> u32 { 1200 }
fn default_feed_source() -> FeedSource { FeedSource::Relay }
fn default_horizon_radius() -> f32 { 150.0 }
fn default_snapshot_interval_ms() -> u64 { 1000 }

fn default_store_path() -> String { "/tmp/ground-link/telemetry.json".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            joystick_index: 0,
            filter_threshold: default_filter_threshold(),
            filter_factor: default_filter_factor(),
            tick_ms: default_tick_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            axis_raw_min: default_axis_raw_min(),
            axis_raw_max: default_axis_raw_max(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            power_level: default_power_level(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            cycle_ms: default_cycle_ms(),
            command_prefix: default_command_prefix(),
            reply_prefix: default_reply_prefix(),
            terminator: default_terminator(),
            forward_to_relay: default_forward_to_relay(),
            stats_interval_cycles: default_stats_interval_cycles(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
            path: default_relay_path(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            channel_capacity: default_channel_capacity(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            width: default_width(),
            height: default_height(),
            source: default_feed_source(),
            horizon_radius: default_horizon_radius(),
            snapshot_path: String::new(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl RelayConfig {
    /// Websocket URL clients use to reach this relay.
    ///
    /// # Examples
    ///
    /// ```
    /// use ground_link::config::RelayConfig;
    ///
    /// let relay = RelayConfig::default();
    /// assert_eq!(relay.url(), "ws://127.0.0.1:8765/client");
    /// ```
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

fn invalid(msg: impl std::fmt::Display) -> GroundLinkError {
    GroundLinkError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ground_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let joystick = &self.joystick;

        if joystick.filter_threshold < 0.0 || joystick.filter_threshold > 0.5 {
            return Err(invalid("filter_threshold must be between 0.0 and 0.5"));
        }

        if joystick.filter_factor < 0.0 || joystick.filter_factor >= 1.0 {
            return Err(invalid("filter_factor must be in [0.0, 1.0)"));
        }

        if joystick.tick_ms == 0 || joystick.tick_ms > 1000 {
            return Err(invalid("tick_ms must be between 1 and 1000"));
        }

        if joystick.reconnect_interval_ms == 0 || joystick.reconnect_interval_ms > 60000 {
            return Err(invalid("joystick reconnect_interval_ms must be between 1 and 60000"));
        }

        if joystick.axis_raw_min >= joystick.axis_raw_max {
            return Err(invalid("axis_raw_min must be less than axis_raw_max"));
        }

        // Validate serial port configuration
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600].contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600",
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if let Some(level) = self.serial.power_level {
            if level > 30 {
                return Err(invalid("power_level must be between 0 and 30"));
            }
        }

        // Validate radio framing
        if self.radio.cycle_ms == 0 || self.radio.cycle_ms > 10000 {
            return Err(invalid("cycle_ms must be between 1 and 10000"));
        }

        for (name, value) in [
            ("command_prefix", &self.radio.command_prefix),
            ("reply_prefix", &self.radio.reply_prefix),
        ] {
            if value.is_empty() || value.contains(|c: char| matches!(c, ':' | ',' | ';' | '\n' | '\r')) {
                return Err(invalid(format!(
                    "{} must be non-empty and must not contain ':', ',', ';' or line breaks",
                    name
                )));
            }
        }

        if !self.radio.terminator.ends_with('\n') {
            return Err(invalid("terminator must end with a newline"));
        }

        if self.radio.stats_interval_cycles == 0 {
            return Err(invalid("stats_interval_cycles must be greater than 0"));
        }

        // Validate relay
        if self.relay.host.is_empty() {
            return Err(invalid("relay host cannot be empty"));
        }

        if !self.relay.path.starts_with('/') {
            return Err(invalid("relay path must start with '/'"));
        }

        if self.relay.shutdown_grace_ms == 0 || self.relay.shutdown_grace_ms > 60000 {
            return Err(invalid("shutdown_grace_ms must be between 1 and 60000"));
        }

        if self.relay.channel_capacity == 0 {
            return Err(invalid("channel_capacity must be greater than 0"));
        }

        if self.relay.reconnect_interval_ms == 0 || self.relay.reconnect_interval_ms > 60000 {
            return Err(invalid("relay reconnect_interval_ms must be between 1 and 60000"));
        }

        // Validate HUD
        if self.hud.fps == 0 || self.hud.fps > 240 {
            return Err(invalid("fps must be between 1 and 240"));
        }

        if self.hud.width < 320 || self.hud.height < 240 || self.hud.width > 7680 || self.hud.height > 4320 {
            return Err(invalid("resolution must be between 320x240 and 7680x4320"));
        }

        if self.hud.horizon_radius < 10.0 || self.hud.horizon_radius > 1000.0 {
            return Err(invalid("horizon_radius must be between 10 and 1000"));
        }

        if self.hud.snapshot_interval_ms == 0 {
            return Err(invalid("snapshot_interval_ms must be greater than 0"));
        }

        if self.store.path.is_empty() {
            return Err(invalid("store path cannot be empty"));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
