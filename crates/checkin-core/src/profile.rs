//! Operating profiles: strict appointment check-in and relaxed emergency lookup.
//!
//! The two profiles share one code path and differ only in the constants
//! below and in whether blinks are required.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which verification flow a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "appointment")]
    AppointmentCheckIn,
    #[serde(rename = "medical-record")]
    EmergencyLookup,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::AppointmentCheckIn => "appointment",
            Mode::EmergencyLookup => "medical-record",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "appointment" | "check-in" | "checkin" => Ok(Mode::AppointmentCheckIn),
            "medical-record" | "emergency" | "lookup" => Ok(Mode::EmergencyLookup),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Thresholds applied by the extractor, debouncer and scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Profile {
    /// Face centre must lie within `radius × center_tolerance` of the target centre.
    pub center_tolerance: f32,
    /// Face size may deviate from the target size by at most `target × size_tolerance`.
    pub size_tolerance: f32,
    /// Exclusive lower brightness bound.
    pub brightness_low: f32,
    /// Exclusive upper brightness bound.
    pub brightness_high: f32,
    /// Debounced blinks needed before capture; 0 disables the debouncer.
    pub required_blinks: u32,
    /// Countdown length in one-second ticks.
    pub countdown_secs: u32,
    /// Whether the camera starts without an explicit operator action.
    pub auto_start: bool,
}

impl Profile {
    pub const STRICT: Profile = Profile {
        center_tolerance: 0.3,
        size_tolerance: 0.3,
        brightness_low: 60.0,
        brightness_high: 200.0,
        required_blinks: 2,
        countdown_secs: 3,
        auto_start: false,
    };

    pub const RELAXED: Profile = Profile {
        center_tolerance: 0.4,
        size_tolerance: 0.4,
        brightness_low: 40.0,
        brightness_high: 220.0,
        required_blinks: 0,
        countdown_secs: 2,
        auto_start: true,
    };

    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::AppointmentCheckIn => Self::STRICT,
            Mode::EmergencyLookup => Self::RELAXED,
        }
    }

    pub fn blinks_enabled(&self) -> bool {
        self.required_blinks > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_per_mode() {
        let strict = Profile::for_mode(Mode::AppointmentCheckIn);
        assert_eq!(strict.required_blinks, 2);
        assert_eq!(strict.countdown_secs, 3);
        assert!(strict.blinks_enabled());

        let relaxed = Profile::for_mode(Mode::EmergencyLookup);
        assert_eq!(relaxed.required_blinks, 0);
        assert_eq!(relaxed.countdown_secs, 2);
        assert!(relaxed.auto_start);
        assert!(!relaxed.blinks_enabled());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("appointment".parse::<Mode>(), Ok(Mode::AppointmentCheckIn));
        assert_eq!("Emergency".parse::<Mode>(), Ok(Mode::EmergencyLookup));
        assert_eq!("medical-record".parse::<Mode>(), Ok(Mode::EmergencyLookup));
        assert!("walk-in".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&Mode::EmergencyLookup).unwrap(),
            "\"medical-record\""
        );
    }
}
