//! # Controller Input Mapper Module
//!
//! Translates raw evdev events into device-independent [`RawInputEvent`]s.
//!
//! ## Axis Codes (EV_ABS)
//!
//! | Axis id | evdev Code |
//! |---------|------------|
//! | 0 | ABS_X |
//! | 1 | ABS_Y |
//! | 2 | ABS_Z |
//! | 3 | ABS_RX |
//! | 4 | ABS_RY |
//! | 5 | ABS_RZ |
//!
//! Raw values in `raw_min..=raw_max` are normalized onto -1.0..=1.0.
//!
//! ## Button Codes (EV_KEY)
//!
//! Gamepads report `BTN_SOUTH` .. `BTN_DPAD_RIGHT` (ids 0-16, see
//! [`GAMEPAD_BUTTONS`]). Flight sticks report `BTN_TRIGGER` .. `BTN_BASE6`
//! (ids 0-11, see [`JOYSTICK_BUTTONS`]). Hat switches (`ABS_HAT0X`,
//! `ABS_HAT0Y`) are folded into the d-pad buttons 13-16.
//!
//! ## Reports (EV_SYN)
//!
//! `SYN_REPORT` closes one device report and maps to [`RawInputEvent::Sync`].

use evdev::{AbsoluteAxisType, InputEvent, InputEventKind, Key, Synchronization};

/// Axis ids by position.
pub const AXES: [AbsoluteAxisType; 6] = [
    AbsoluteAxisType::ABS_X,
    AbsoluteAxisType::ABS_Y,
    AbsoluteAxisType::ABS_Z,
    AbsoluteAxisType::ABS_RX,
    AbsoluteAxisType::ABS_RY,
    AbsoluteAxisType::ABS_RZ,
];

/// Gamepad button ids by position.
pub const GAMEPAD_BUTTONS: [Key; 17] = [
    Key::BTN_SOUTH,
    Key::BTN_EAST,
    Key::BTN_NORTH,
    Key::BTN_WEST,
    Key::BTN_TL,
    Key::BTN_TR,
    Key::BTN_TL2,
    Key::BTN_TR2,
    Key::BTN_SELECT,
    Key::BTN_START,
    Key::BTN_MODE,
    Key::BTN_THUMBL,
    Key::BTN_THUMBR,
    Key::BTN_DPAD_UP,
    Key::BTN_DPAD_DOWN,
    Key::BTN_DPAD_LEFT,
    Key::BTN_DPAD_RIGHT,
];

/// Flight-stick button ids by position.
pub const JOYSTICK_BUTTONS: [Key; 12] = [
    Key::BTN_TRIGGER,
    Key::BTN_THUMB,
    Key::BTN_THUMB2,
    Key::BTN_TOP,
    Key::BTN_TOP2,
    Key::BTN_PINKIE,
    Key::BTN_BASE,
    Key::BTN_BASE2,
    Key::BTN_BASE3,
    Key::BTN_BASE4,
    Key::BTN_BASE5,
    Key::BTN_BASE6,
];

/// D-pad button ids, shared by key events and hat axes.
pub const DPAD_UP: u8 = 13;
pub const DPAD_DOWN: u8 = 14;
pub const DPAD_LEFT: u8 = 15;
pub const DPAD_RIGHT: u8 = 16;

/// A device-independent input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInputEvent {
    /// Axis moved; value already normalized to -1.0..=1.0 but not filtered.
    AxisMotion { axis_id: u8, value: f32 },
    ButtonDown(u8),
    ButtonUp(u8),
    /// End of one device report; the events before it belong together.
    Sync,
}

/// Maps evdev events onto axis and button ids.
///
/// # Examples
///
/// ```
/// use evdev::{AbsoluteAxisType, EventType, InputEvent};
/// use ground_link::controller::mapper::{EventMapper, RawInputEvent};
///
/// let mapper = EventMapper::new(0, 255);
/// let event = InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_X.0, 255);
/// assert_eq!(
///     mapper.map_event(&event),
///     vec![RawInputEvent::AxisMotion { axis_id: 0, value: 1.0 }]
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EventMapper {
    raw_min: i32,
    raw_max: i32,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self::new(0, 255)
    }
}

impl EventMapper {
    /// Creates a mapper for axes reporting `raw_min..=raw_max`.
    #[must_use]
    pub fn new(raw_min: i32, raw_max: i32) -> Self {
        Self { raw_min, raw_max }
    }

    /// Normalizes a raw axis value onto -1.0..=1.0.
    #[must_use]
    pub fn normalize(&self, raw: i32) -> f32 {
        let span = (self.raw_max - self.raw_min).max(1) as f32;
        let scaled = 2.0 * (raw - self.raw_min) as f32 / span - 1.0;
        scaled.clamp(-1.0, 1.0)
    }

    /// Button id for a key, if it is one we track.
    #[must_use]
    pub fn button_id(key: Key) -> Option<u8> {
        GAMEPAD_BUTTONS
            .iter()
            .position(|&k| k == key)
            .or_else(|| JOYSTICK_BUTTONS.iter().position(|&k| k == key))
            .map(|i| i as u8)
    }

    /// Translates one evdev event. Unknown codes map to nothing.
    #[must_use]
    pub fn map_event(&self, event: &InputEvent) -> Vec<RawInputEvent> {
        match event.kind() {
            InputEventKind::AbsAxis(AbsoluteAxisType::ABS_HAT0X) => {
                hat_events(event.value(), DPAD_LEFT, DPAD_RIGHT)
            }
            InputEventKind::AbsAxis(AbsoluteAxisType::ABS_HAT0Y) => {
                hat_events(event.value(), DPAD_UP, DPAD_DOWN)
            }
            InputEventKind::AbsAxis(axis) => match AXES.iter().position(|&a| a == axis) {
                Some(axis_id) => vec![RawInputEvent::AxisMotion {
                    axis_id: axis_id as u8,
                    value: self.normalize(event.value()),
                }],
                None => Vec::new(),
            },
            InputEventKind::Key(key) => match Self::button_id(key) {
                // value 2 is autorepeat; still held
                Some(id) if event.value() != 0 => vec![RawInputEvent::ButtonDown(id)],
                Some(id) => vec![RawInputEvent::ButtonUp(id)],
                None => Vec::new(),
            },
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => vec![RawInputEvent::Sync],
            _ => Vec::new(),
        }
    }
}

/// Hat axis: -1 presses `negative`, 1 presses `positive`, 0 releases both.
fn hat_events(value: i32, negative: u8, positive: u8) -> Vec<RawInputEvent> {
    match value.signum() {
        -1 => vec![RawInputEvent::ButtonDown(negative), RawInputEvent::ButtonUp(positive)],
        1 => vec![RawInputEvent::ButtonUp(negative), RawInputEvent::ButtonDown(positive)],
        _ => vec![RawInputEvent::ButtonUp(negative), RawInputEvent::ButtonUp(positive)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    /// Helper to create an axis event for testing.
    fn make_axis_event(axis: AbsoluteAxisType, value: i32) -> InputEvent {
        InputEvent::new(EventType::ABSOLUTE, axis.0, value)
    }

    /// Helper to create a key event for testing.
    fn make_key_event(key: Key, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY, key.code(), value)
    }

    #[test]
    fn test_normalize_endpoints() {
        let mapper = EventMapper::new(0, 255);
        assert_eq!(mapper.normalize(0), -1.0);
        assert_eq!(mapper.normalize(255), 1.0);
        assert!(mapper.normalize(128).abs() < 0.01);
    }

    #[test]
    fn test_normalize_signed_range() {
        let mapper = EventMapper::new(-32768, 32767);
        assert_eq!(mapper.normalize(-32768), -1.0);
        assert_eq!(mapper.normalize(32767), 1.0);
        assert!(mapper.normalize(0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_clamps_out_of_range() {
        let mapper = EventMapper::new(0, 255);
        assert_eq!(mapper.normalize(400), 1.0);
        assert_eq!(mapper.normalize(-10), -1.0);
    }

    #[test]
    fn test_all_axes_map_in_order() {
        let mapper = EventMapper::default();
        for (i, axis) in AXES.iter().enumerate() {
            let events = mapper.map_event(&make_axis_event(*axis, 0));
            assert_eq!(
                events,
                vec![RawInputEvent::AxisMotion { axis_id: i as u8, value: -1.0 }]
            );
        }
    }

    #[test]
    fn test_unknown_axis_ignored() {
        let mapper = EventMapper::default();
        let events = mapper.map_event(&make_axis_event(AbsoluteAxisType::ABS_WHEEL, 10));
        assert!(events.is_empty());
    }

    #[test]
    fn test_gamepad_buttons() {
        let mapper = EventMapper::default();
        assert_eq!(
            mapper.map_event(&make_key_event(Key::BTN_SOUTH, 1)),
            vec![RawInputEvent::ButtonDown(0)]
        );
        assert_eq!(
            mapper.map_event(&make_key_event(Key::BTN_DPAD_RIGHT, 0)),
            vec![RawInputEvent::ButtonUp(16)]
        );
    }

    #[test]
    fn test_autorepeat_counts_as_down() {
        let mapper = EventMapper::default();
        assert_eq!(
            mapper.map_event(&make_key_event(Key::BTN_TL, 2)),
            vec![RawInputEvent::ButtonDown(4)]
        );
    }

    #[test]
    fn test_joystick_buttons() {
        assert_eq!(EventMapper::button_id(Key::BTN_TRIGGER), Some(0));
        assert_eq!(EventMapper::button_id(Key::BTN_BASE6), Some(11));
        assert_eq!(EventMapper::button_id(Key::KEY_A), None);
    }

    #[test]
    fn test_button_ids_fit_snapshot() {
        use crate::telemetry::NUM_BUTTONS;
        assert_eq!(GAMEPAD_BUTTONS.len(), NUM_BUTTONS);
        assert!(JOYSTICK_BUTTONS.len() <= NUM_BUTTONS);
    }

    #[test]
    fn test_hat_maps_to_dpad() {
        let mapper = EventMapper::default();
        assert_eq!(
            mapper.map_event(&make_axis_event(AbsoluteAxisType::ABS_HAT0X, -1)),
            vec![RawInputEvent::ButtonDown(DPAD_LEFT), RawInputEvent::ButtonUp(DPAD_RIGHT)]
        );
        assert_eq!(
            mapper.map_event(&make_axis_event(AbsoluteAxisType::ABS_HAT0Y, 1)),
            vec![RawInputEvent::ButtonUp(DPAD_UP), RawInputEvent::ButtonDown(DPAD_DOWN)]
        );
        assert_eq!(
            mapper.map_event(&make_axis_event(AbsoluteAxisType::ABS_HAT0X, 0)),
            vec![RawInputEvent::ButtonUp(DPAD_LEFT), RawInputEvent::ButtonUp(DPAD_RIGHT)]
        );
    }

    #[test]
    fn test_sync_report_ends_batch() {
        let mapper = EventMapper::default();
        let report = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        assert_eq!(mapper.map_event(&report), vec![RawInputEvent::Sync]);

        // SYN_DROPPED
        let dropped = InputEvent::new(EventType::SYNCHRONIZATION, 3, 0);
        assert!(mapper.map_event(&dropped).is_empty());
    }
}
