//! Input-to-drive mapping policy.
//!
//! Pure numeric layer between the controller input seam and the hub
//! command seam: deadzone filtering, speed limiting, and steering
//! inversion. Report decoding and wire encoding live outside this crate.

use serde::{Deserialize, Serialize};

/// Full-scale magnitude of an analog stick axis.
pub const STICK_MAX: i16 = i16::MAX;
/// Full-scale magnitude of an analog trigger.
pub const TRIGGER_MAX: u16 = 1023;

/// Tunable mapping parameters, persisted with the rest of the settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSettings {
    /// Speed clamp, 0-100.
    #[serde(default = "default_max_speed")]
    pub max_speed_percent: u8,
    /// Inputs below this magnitude (in percent) are treated as centered.
    #[serde(default = "default_deadzone")]
    pub deadzone_percent: u8,
    /// Use the trigger pair for acceleration instead of the left stick.
    #[serde(default = "default_true")]
    pub trigger_mode: bool,
    #[serde(default)]
    pub invert_steering: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            max_speed_percent: default_max_speed(),
            deadzone_percent: default_deadzone(),
            trigger_mode: default_true(),
            invert_steering: false,
        }
    }
}

fn default_max_speed() -> u8 {
    75
}
fn default_deadzone() -> u8 {
    3
}
fn default_true() -> bool {
    true
}

/// Raw analog state read from the controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerInput {
    pub left_stick_x: i16,
    pub left_stick_y: i16,
    pub left_trigger: u16,
    pub right_trigger: u16,
}

/// Mapped drive output, both axes in percent (-100..=100).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveCommand {
    pub speed: i8,
    pub steering: i8,
}

/// Map raw controller input to a drive command.
pub fn map_drive(input: &ControllerInput, settings: &ControlSettings) -> DriveCommand {
    let speed_pct = if settings.trigger_mode {
        trigger_percent(input.right_trigger) - trigger_percent(input.left_trigger)
    } else {
        axis_percent(input.left_stick_y)
    };
    let steering_pct = axis_percent(input.left_stick_x);

    let max_speed = f32::from(settings.max_speed_percent.min(100));
    let deadzone = f32::from(settings.deadzone_percent);

    let speed = apply_deadzone(speed_pct, deadzone).clamp(-max_speed, max_speed);
    let mut steering = apply_deadzone(steering_pct, deadzone).clamp(-100.0, 100.0);
    if settings.invert_steering {
        steering = -steering;
    }

    DriveCommand {
        speed: speed.round() as i8,
        steering: steering.round() as i8,
    }
}

fn axis_percent(value: i16) -> f32 {
    f32::from(value) / f32::from(STICK_MAX) * 100.0
}

fn trigger_percent(value: u16) -> f32 {
    f32::from(value.min(TRIGGER_MAX)) / f32::from(TRIGGER_MAX) * 100.0
}

fn apply_deadzone(percent: f32, deadzone: f32) -> f32 {
    if percent.abs() < deadzone {
        0.0
    } else {
        percent
    }
}
