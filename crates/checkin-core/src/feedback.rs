//! Human-readable guidance shown to the subject on every tick.

use serde::Serialize;
use std::fmt;

use crate::signals::LivenessSignals;

/// Offset (in target radii) beyond which a horizontal or vertical hint is given.
const DIRECTION_HINT_FRACTION: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    Initializing,
    NoFace,
    TooDark,
    TooBright,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    MoveCloser,
    MoveBack,
    Blink { remaining: u32 },
    HoldStill,
}

impl Feedback {
    /// Pick the most pressing instruction for the current signals.
    ///
    /// Lighting is reported first, then centering, then distance, then blinks.
    pub fn for_signals(
        signals: &LivenessSignals,
        brightness_low: f32,
        blinks_remaining: u32,
    ) -> Self {
        if !signals.face_detected {
            return Feedback::NoFace;
        }
        if !signals.lighting_ok {
            return if signals.brightness as f32 <= brightness_low {
                Feedback::TooDark
            } else {
                Feedback::TooBright
            };
        }
        if !signals.centered {
            let (dx, dy) = signals.offset.unwrap_or((0.0, 0.0));
            return if dx < -DIRECTION_HINT_FRACTION {
                Feedback::MoveRight
            } else if dx > DIRECTION_HINT_FRACTION {
                Feedback::MoveLeft
            } else if dy < -DIRECTION_HINT_FRACTION {
                Feedback::MoveDown
            } else {
                Feedback::MoveUp
            };
        }
        if !signals.right_size {
            return match signals.scale {
                Some(scale) if scale < 1.0 => Feedback::MoveCloser,
                _ => Feedback::MoveBack,
            };
        }
        if blinks_remaining > 0 {
            return Feedback::Blink {
                remaining: blinks_remaining,
            };
        }
        Feedback::HoldStill
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Initializing => f.write_str("Initializing camera..."),
            Feedback::NoFace => f.write_str("No face detected"),
            Feedback::TooDark => f.write_str("Too dark - add more light"),
            Feedback::TooBright => f.write_str("Too bright - reduce light"),
            Feedback::MoveLeft => f.write_str("Move left"),
            Feedback::MoveRight => f.write_str("Move right"),
            Feedback::MoveUp => f.write_str("Move up"),
            Feedback::MoveDown => f.write_str("Move down"),
            Feedback::MoveCloser => f.write_str("Move closer"),
            Feedback::MoveBack => f.write_str("Move back"),
            Feedback::Blink { remaining: 1 } => f.write_str("Blink 1 more time naturally"),
            Feedback::Blink { remaining } => {
                write!(f, "Blink {remaining} more times naturally")
            }
            Feedback::HoldStill => f.write_str("Perfect! Hold still..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> LivenessSignals {
        LivenessSignals {
            face_detected: true,
            centered: true,
            right_size: true,
            lighting_ok: true,
            avg_ear: 0.3,
            brightness: 120,
            offset: Some((0.0, 0.0)),
            scale: Some(1.0),
        }
    }

    #[test]
    fn test_dark_scene() {
        let s = LivenessSignals {
            lighting_ok: false,
            brightness: 30,
            ..signals()
        };
        let fb = Feedback::for_signals(&s, 60.0, 2);
        assert_eq!(fb, Feedback::TooDark);
        assert!(fb.to_string().contains("Too dark"));
    }

    #[test]
    fn test_bright_scene() {
        let s = LivenessSignals {
            lighting_ok: false,
            brightness: 230,
            ..signals()
        };
        assert_eq!(Feedback::for_signals(&s, 60.0, 0), Feedback::TooBright);
    }

    #[test]
    fn test_direction_hints() {
        let off = |dx, dy| LivenessSignals {
            centered: false,
            offset: Some((dx, dy)),
            ..signals()
        };
        assert_eq!(Feedback::for_signals(&off(-0.3, 0.0), 60.0, 0), Feedback::MoveRight);
        assert_eq!(Feedback::for_signals(&off(0.3, 0.0), 60.0, 0), Feedback::MoveLeft);
        assert_eq!(Feedback::for_signals(&off(0.0, -0.3), 60.0, 0), Feedback::MoveDown);
        assert_eq!(Feedback::for_signals(&off(0.0, 0.3), 60.0, 0), Feedback::MoveUp);
    }

    #[test]
    fn test_distance_hints() {
        let sized = |scale| LivenessSignals {
            right_size: false,
            scale: Some(scale),
            ..signals()
        };
        assert_eq!(Feedback::for_signals(&sized(0.5), 60.0, 0), Feedback::MoveCloser);
        assert_eq!(Feedback::for_signals(&sized(1.6), 60.0, 0), Feedback::MoveBack);
    }

    #[test]
    fn test_blink_prompt_then_hold_still() {
        let fb = Feedback::for_signals(&signals(), 60.0, 2);
        assert_eq!(fb.to_string(), "Blink 2 more times naturally");
        assert_eq!(
            Feedback::for_signals(&signals(), 60.0, 1).to_string(),
            "Blink 1 more time naturally"
        );
        assert_eq!(Feedback::for_signals(&signals(), 60.0, 0), Feedback::HoldStill);
    }
}
