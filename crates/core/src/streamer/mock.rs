//! Synthetic signals for checking a rig connection without motion data.

use crate::Mode;

/// Left forearm roll, driven by the baseline and left-turn signals.
pub const MOCK_LEFT_ADDRESS: &str = "/mh/LeftForeArm_roll";
pub const MOCK_RIGHT_ADDRESS: &str = "/mh/RightForeArm_roll";

/// Address and value of the single mock signal for `frame`.
///
/// Turns swing the matching forearm between 10 and 50 degrees; every other
/// mode sways the left forearm within ±5 degrees at half the rate.
pub fn mock_signal(mode: Mode, frame: u64) -> (&'static str, f32) {
    let phase = frame as f32 * 0.1;
    match mode {
        Mode::TurnLeft => (MOCK_LEFT_ADDRESS, 30.0 + 20.0 * phase.sin()),
        Mode::TurnRight => (MOCK_RIGHT_ADDRESS, 30.0 + 20.0 * phase.sin()),
        _ => (MOCK_LEFT_ADDRESS, 5.0 * (phase * 0.5).sin()),
    }
}

/// Mode name reported on the mode address while mocking.
pub fn mock_mode_name(mode: Mode) -> String {
    format!("{}_MOCK", mode.as_str())
}
