//! # Joystick Device Module
//!
//! Detects and opens a joystick or gamepad through the Linux evdev
//! interface and exposes it as an [`EventSource`].
//!
//! ## Device Detection
//!
//! With an explicit `device_path` that device is opened directly. Otherwise
//! all `/dev/input/event*` nodes are scanned in sorted order and every device
//! reporting absolute axes plus gamepad or joystick buttons is a candidate;
//! `joystick_index` picks among them.

use async_trait::async_trait;
use evdev::{Device, Key};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::mapper::{EventMapper, RawInputEvent};
use crate::config::JoystickConfig;
use crate::error::{GroundLinkError, Result};

/// Anything that yields input events until it disappears.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` once the device is gone.
    async fn next_event(&mut self) -> Result<RawInputEvent>;
}

/// An opened evdev joystick.
pub struct EvdevJoystick {
    stream: evdev::EventStream,
    device_path: String,
    name: String,
    mapper: EventMapper,
    pending: VecDeque<RawInputEvent>,
}

impl std::fmt::Debug for EvdevJoystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevJoystick")
            .field("device_path", &self.device_path)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl EvdevJoystick {
    /// Open the joystick described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `DeviceUnavailable`: no matching device, or it cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ground_link::config::JoystickConfig;
    /// use ground_link::controller::joystick::EvdevJoystick;
    ///
    /// # async fn demo() -> ground_link::error::Result<()> {
    /// let joystick = EvdevJoystick::open(&JoystickConfig::default())?;
    /// println!("Connected to {}", joystick.device_path());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(config: &JoystickConfig) -> Result<Self> {
        let (path, device) = if config.device_path.is_empty() {
            find_joystick(Path::new("/dev/input"), config.joystick_index)?
        } else {
            let path = PathBuf::from(&config.device_path);
            let device = Device::open(&path).map_err(|e| {
                GroundLinkError::DeviceUnavailable(format!("Failed to open {}: {}", path.display(), e))
            })?;
            (path, device)
        };

        let device_path = path.to_string_lossy().to_string();
        let name = device.name().unwrap_or("unnamed device").to_string();
        let stream = device.into_event_stream().map_err(|e| {
            GroundLinkError::DeviceUnavailable(format!("Failed to stream {}: {}", device_path, e))
        })?;

        info!("Opened joystick '{}' at {}", name, device_path);

        Ok(Self {
            stream,
            device_path,
            name,
            mapper: EventMapper::new(config.axis_raw_min, config.axis_raw_max),
            pending: VecDeque::new(),
        })
    }

    /// The `/dev/input/eventX` path of this joystick.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Human-readable device name reported by the kernel.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl EventSource for EvdevJoystick {
    async fn next_event(&mut self) -> Result<RawInputEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let event = self.stream.next_event().await.map_err(|e| {
                GroundLinkError::DeviceUnavailable(format!("{}: {}", self.device_path, e))
            })?;
            self.pending.extend(self.mapper.map_event(&event));
        }
    }
}

/// Whether a device looks like a joystick or gamepad.
fn is_joystick(device: &Device) -> bool {
    let has_axes = device
        .supported_absolute_axes()
        .map_or(false, |axes| axes.iter().next().is_some());
    let has_buttons = device.supported_keys().map_or(false, |keys| {
        keys.contains(Key::BTN_SOUTH) || keys.contains(Key::BTN_TRIGGER)
    });
    has_axes && has_buttons
}

/// Scan `input_dir` for joysticks and return the `index`-th one.
fn find_joystick(input_dir: &Path, index: usize) -> Result<(PathBuf, Device)> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .map_err(|e| {
            GroundLinkError::DeviceUnavailable(format!("Failed to read {}: {}", input_dir.display(), e))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map_or(false, |name| name.to_string_lossy().starts_with("event"))
        })
        .collect();

    // Sort entries for deterministic device selection when multiple joysticks are connected
    entries.sort();

    let mut found = 0;
    for path in entries {
        match Device::open(&path) {
            Ok(device) if is_joystick(&device) => {
                debug!(
                    "Joystick candidate {}: {} (vendor: 0x{:04x}, product: 0x{:04x})",
                    found,
                    path.display(),
                    device.input_id().vendor(),
                    device.input_id().product()
                );
                if found == index {
                    return Ok((path, device));
                }
                found += 1;
            }
            Ok(_) => {}
            Err(e) => {
                // Permission denied or other errors - skip device
                debug!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    Err(GroundLinkError::DeviceUnavailable(format!(
        "joystick #{} not found ({} candidates in {})",
        index,
        found,
        input_dir.display()
    )))
}
