//! # Telemetry Snapshot
//!
//! The data exchanged between the sampler, the radio bridge and the HUD.
//!
//! A [`TelemetrySnapshot`] is split into two field-groups with one writer
//! each: the joystick sampler owns [`ControlInputs`], the radio bridge owns
//! the received [`Attitude`]. Writers replace their group wholesale through
//! [`FieldGroup`].
//!
//! ## JSON Shape
//!
//! Snapshots serialize to a flat object:
//!
//! ```json
//! {"axis_0": 0.0, ..., "axis_5": 0.0,
//!  "button_0": false, ..., "button_16": false,
//!  "pitch": 1.5, "roll": -3.0, "yaw": 90.0, "throttle": 0.4}
//! ```
//!
//! The attitude keys are absent until the first reply from the aircraft.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of joystick axes carried in a snapshot.
pub const NUM_AXES: usize = 6;

/// Number of joystick buttons carried in a snapshot.
pub const NUM_BUTTONS: usize = 17;

/// One filtered reading of a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisSample {
    pub axis_id: u8,
    /// Normalized value in -1.0..=1.0.
    pub value: f32,
}

/// Joystick-owned field-group: all axes and buttons.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlInputs {
    pub axes: [f32; NUM_AXES],
    pub buttons: [bool; NUM_BUTTONS],
}

impl ControlInputs {
    /// Stores an axis sample. Returns `false` for an unknown axis id.
    pub fn set_axis(&mut self, sample: AxisSample) -> bool {
        match self.axes.get_mut(sample.axis_id as usize) {
            Some(slot) => {
                *slot = sample.value.clamp(-1.0, 1.0);
                true
            }
            None => false,
        }
    }

    /// Stores a button state. Returns `false` for an unknown button id.
    pub fn set_button(&mut self, button_id: u8, pressed: bool) -> bool {
        match self.buttons.get_mut(button_id as usize) {
            Some(slot) => {
                *slot = pressed;
                true
            }
            None => false,
        }
    }

    /// Buttons packed LSB-first: bit `i` is button `i`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ground_link::telemetry::ControlInputs;
    ///
    /// let mut controls = ControlInputs::default();
    /// controls.set_button(0, true);
    /// controls.set_button(16, true);
    /// assert_eq!(controls.button_mask(), 0x1_0001);
    /// ```
    #[must_use]
    pub fn button_mask(&self) -> u32 {
        self.buttons
            .iter()
            .enumerate()
            .filter(|(_, &pressed)| pressed)
            .fold(0u32, |mask, (i, _)| mask | (1 << i))
    }

    /// Inverse of [`ControlInputs::button_mask`]; bits above 16 are ignored.
    pub fn set_button_mask(&mut self, mask: u32) {
        for (i, slot) in self.buttons.iter_mut().enumerate() {
            *slot = mask & (1 << i) != 0;
        }
    }
}

/// Aircraft orientation reported over the radio link, in degrees.
///
/// `throttle` is carried through for telemetry; the HUD ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    #[serde(default)]
    pub throttle: f32,
}

impl Attitude {
    #[must_use]
    pub fn new(pitch: f32, roll: f32, yaw: f32) -> Self {
        Self {
            pitch,
            roll,
            yaw,
            throttle: 0.0,
        }
    }
}

/// A complete view of all telemetry fields at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "FlatSnapshot", into = "FlatSnapshot")]
pub struct TelemetrySnapshot {
    pub controls: ControlInputs,
    pub attitude: Option<Attitude>,
}

/// The unit of a store write: one field-group, replaced wholesale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldGroup {
    Controls(ControlInputs),
    Attitude(Attitude),
}

impl FieldGroup {
    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FieldGroup::Controls(_) => "controls",
            FieldGroup::Attitude(_) => "attitude",
        }
    }
}

impl TelemetrySnapshot {
    /// Replaces the field-group carried by `group`, leaving the other intact.
    pub fn apply(&mut self, group: FieldGroup) {
        match group {
            FieldGroup::Controls(controls) => self.controls = controls,
            FieldGroup::Attitude(attitude) => self.attitude = Some(attitude),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct FlatSnapshot(Map<String, Value>);

const ATTITUDE_KEYS: [&str; 4] = ["pitch", "roll", "yaw", "throttle"];

impl From<TelemetrySnapshot> for FlatSnapshot {
    fn from(snapshot: TelemetrySnapshot) -> Self {
        let mut map = Map::new();
        for (i, value) in snapshot.controls.axes.iter().enumerate() {
            map.insert(format!("axis_{}", i), Value::from(f64::from(*value)));
        }
        for (i, pressed) in snapshot.controls.buttons.iter().enumerate() {
            map.insert(format!("button_{}", i), Value::Bool(*pressed));
        }
        if let Some(attitude) = snapshot.attitude {
            let values = [attitude.pitch, attitude.roll, attitude.yaw, attitude.throttle];
            for (key, value) in ATTITUDE_KEYS.iter().zip(values) {
                map.insert((*key).to_string(), Value::from(f64::from(value)));
            }
        }
        FlatSnapshot(map)
    }
}

fn float_field(map: &Map<String, Value>, key: &str) -> Result<Option<f32>, String> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(|v| Some(v as f32))
            .ok_or_else(|| format!("{} must be a number", key)),
    }
}

impl TryFrom<FlatSnapshot> for TelemetrySnapshot {
    type Error = String;

    fn try_from(flat: FlatSnapshot) -> Result<Self, Self::Error> {
        let map = flat.0;
        let mut snapshot = TelemetrySnapshot::default();

        for i in 0..NUM_AXES {
            if let Some(value) = float_field(&map, &format!("axis_{}", i))? {
                snapshot.controls.axes[i] = value;
            }
        }

        for i in 0..NUM_BUTTONS {
            let key = format!("button_{}", i);
            match map.get(&key) {
                None => {}
                Some(Value::Bool(pressed)) => snapshot.controls.buttons[i] = *pressed,
                Some(_) => return Err(format!("{} must be a boolean", key)),
            }
        }

        let pitch = float_field(&map, "pitch")?;
        let roll = float_field(&map, "roll")?;
        let yaw = float_field(&map, "yaw")?;
        let throttle = float_field(&map, "throttle")?;

        snapshot.attitude = match (pitch, roll, yaw) {
            (Some(pitch), Some(roll), Some(yaw)) => Some(Attitude {
                pitch,
                roll,
                yaw,
                throttle: throttle.unwrap_or(0.0),
            }),
            (None, None, None) => None,
            _ => return Err("pitch, roll and yaw must be present together".to_string()),
        };

        Ok(snapshot)
    }
}
