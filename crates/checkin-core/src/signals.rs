//! Frame signal extraction: turns one detection result into liveness signals.
//!
//! Each detection tick yields a [`LivenessSignals`] record describing whether
//! the subject is centred in the target circle, presented at the right
//! distance, and adequately lit, plus the mean eye aspect ratio (EAR) that
//! feeds the blink debouncer.
//!
//! EAR follows the six-point eye contour convention of the 68-point landmark
//! model:
//!
//! ```text
//!   EAR = (|p2 - p6| + |p3 - p5|) / (2 * |p1 - p4|)
//! ```
//!
//! An open eye sits around 0.3; a closed eye drops towards 0.1.

use serde::Serialize;

use crate::frame::{DetectionFrame, Point, TargetRegion};
use crate::profile::Profile;

/// EAR returned when the eye contour is missing or degenerate.
pub const NEUTRAL_EAR: f32 = 0.3;
const MIN_EAR: f32 = 0.1;
const MAX_EAR: f32 = 0.5;

/// Normalized per-tick liveness evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivenessSignals {
    pub face_detected: bool,
    pub centered: bool,
    pub right_size: bool,
    pub lighting_ok: bool,
    /// Mean EAR of both eyes; 0.0 when no face is present.
    pub avg_ear: f32,
    /// Rounded mean luma of the target region.
    pub brightness: u32,
    /// Face centre minus target centre, in units of the target radius.
    pub offset: Option<(f32, f32)>,
    /// Face size divided by target size.
    pub scale: Option<f32>,
}

impl LivenessSignals {
    /// Centering and sizing both hold.
    pub fn positioned(&self) -> bool {
        self.centered && self.right_size
    }

    /// Every positional and lighting requirement holds (blinks are tracked separately).
    pub fn all_met(&self) -> bool {
        self.face_detected && self.positioned() && self.lighting_ok
    }
}

/// Compute the eye aspect ratio for six ordered eye-contour points.
///
/// Returns [`NEUTRAL_EAR`] for fewer than six points or a zero horizontal
/// span; otherwise the ratio clamped to `[0.1, 0.5]`.
pub fn eye_aspect_ratio(eye: &[Point]) -> f32 {
    if eye.len() < 6 {
        return NEUTRAL_EAR;
    }
    let (p1, p2, p3, p4, p5, p6) = (&eye[0], &eye[1], &eye[2], &eye[3], &eye[4], &eye[5]);

    let vertical1 = p2.distance(p6);
    let vertical2 = p3.distance(p5);
    let horizontal = p1.distance(p4);

    if horizontal == 0.0 || !horizontal.is_finite() {
        return NEUTRAL_EAR;
    }

    let ear = (vertical1 + vertical2) / (2.0 * horizontal);
    if !ear.is_finite() {
        return NEUTRAL_EAR;
    }
    ear.clamp(MIN_EAR, MAX_EAR)
}

/// Whether `brightness` lies strictly inside the profile's band.
pub fn lighting_ok(brightness: f32, profile: &Profile) -> bool {
    profile.brightness_low < brightness && brightness < profile.brightness_high
}

/// Derive liveness signals for one frame.
///
/// Without a face every positional signal is false; lighting is still
/// reported from the brightness sample so the UI can explain a dark scene.
pub fn extract_signals(
    frame: &DetectionFrame,
    region: &TargetRegion,
    profile: &Profile,
) -> LivenessSignals {
    let brightness = frame.brightness.clamp(0.0, 255.0);
    let lighting = lighting_ok(brightness, profile);
    let rounded = brightness.round() as u32;

    let Some(face) = &frame.face else {
        return LivenessSignals {
            face_detected: false,
            centered: false,
            right_size: false,
            lighting_ok: lighting,
            avg_ear: 0.0,
            brightness: rounded,
            offset: None,
            scale: None,
        };
    };

    let face_center = face.bbox.center();
    let distance = face_center.distance(&region.center);
    let centered = distance < region.radius * profile.center_tolerance;

    let target_size = region.target_size();
    let face_size = face.bbox.size();
    let right_size = (face_size - target_size).abs() < target_size * profile.size_tolerance;

    let avg_ear = (eye_aspect_ratio(&face.left_eye) + eye_aspect_ratio(&face.right_eye)) / 2.0;

    let offset = if region.radius > 0.0 {
        Some((
            (face_center.x - region.center.x) / region.radius,
            (face_center.y - region.center.y) / region.radius,
        ))
    } else {
        None
    };
    let scale = (target_size > 0.0).then(|| face_size / target_size);

    LivenessSignals {
        face_detected: true,
        centered,
        right_size,
        lighting_ok: lighting,
        avg_ear,
        brightness: rounded,
        offset,
        scale,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frame::{BoundingBox, FaceDetection};

    /// Eye contour with horizontal span 30 px and the given vertical half-opening.
    pub(crate) fn eye(opening: f32) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, -opening),
            Point::new(20.0, -opening),
            Point::new(30.0, 0.0),
            Point::new(20.0, opening),
            Point::new(10.0, opening),
        ]
    }

    /// Face centred in a 640x480 frame at the target size, eyes with the given opening.
    pub(crate) fn centered_face(opening: f32) -> FaceDetection {
        let region = TargetRegion::for_frame(640, 480);
        let size = region.target_size();
        FaceDetection {
            bbox: BoundingBox {
                x: region.center.x - size / 2.0,
                y: region.center.y - size / 2.0,
                width: size,
                height: size,
            },
            landmarks: Vec::new(),
            left_eye: eye(opening),
            right_eye: eye(opening),
        }
    }

    #[test]
    fn test_open_eye_above_blink_threshold() {
        // vertical spans 10 px each, horizontal 30 px -> 0.333
        let ear = eye_aspect_ratio(&eye(5.0));
        assert!(ear > 0.27, "ear = {ear}");
    }

    #[test]
    fn test_closed_eye_below_blink_threshold() {
        let ear = eye_aspect_ratio(&eye(0.1));
        assert!(ear < 0.27, "ear = {ear}");
        assert_eq!(ear, MIN_EAR);
    }

    #[test]
    fn test_degenerate_eye_is_neutral() {
        assert_eq!(eye_aspect_ratio(&[]), NEUTRAL_EAR);
        assert_eq!(eye_aspect_ratio(&eye(5.0)[..5]), NEUTRAL_EAR);
        let collapsed = vec![Point::new(1.0, 1.0); 6];
        assert_eq!(eye_aspect_ratio(&collapsed), NEUTRAL_EAR);
    }

    #[test]
    fn test_wide_open_eye_is_clamped() {
        assert_eq!(eye_aspect_ratio(&eye(40.0)), MAX_EAR);
    }

    #[test]
    fn test_centered_face_meets_position_requirements() {
        let region = TargetRegion::for_frame(640, 480);
        let frame = DetectionFrame {
            timestamp_ms: 0,
            brightness: 120.0,
            face: Some(centered_face(5.0)),
        };
        let s = extract_signals(&frame, &region, &Profile::STRICT);
        assert!(s.face_detected && s.centered && s.right_size && s.lighting_ok);
        assert!(s.all_met());
        assert_eq!(s.brightness, 120);
        assert!(s.avg_ear > 0.27);
    }

    #[test]
    fn test_off_center_face_not_centered() {
        let region = TargetRegion::for_frame(640, 480);
        let mut face = centered_face(5.0);
        face.bbox.x -= region.radius * 0.35;
        let frame = DetectionFrame {
            timestamp_ms: 0,
            brightness: 120.0,
            face: Some(face),
        };
        let strict = extract_signals(&frame, &region, &Profile::STRICT);
        assert!(!strict.centered);
        assert!(strict.offset.unwrap().0 < -0.25);

        // The relaxed profile tolerates up to 0.4 r.
        let relaxed = extract_signals(&frame, &region, &Profile::RELAXED);
        assert!(relaxed.centered);
    }

    #[test]
    fn test_small_face_is_wrong_size() {
        let region = TargetRegion::for_frame(640, 480);
        let mut face = centered_face(5.0);
        let shrink = face.bbox.width * 0.5;
        face.bbox.x += shrink / 2.0;
        face.bbox.y += shrink / 2.0;
        face.bbox.width -= shrink;
        face.bbox.height -= shrink;
        let frame = DetectionFrame {
            timestamp_ms: 0,
            brightness: 120.0,
            face: Some(face),
        };
        let s = extract_signals(&frame, &region, &Profile::STRICT);
        assert!(s.centered);
        assert!(!s.right_size);
        assert!(s.scale.unwrap() < 1.0);
    }

    #[test]
    fn test_lighting_band_is_exclusive() {
        assert!(!lighting_ok(30.0, &Profile::STRICT));
        assert!(!lighting_ok(60.0, &Profile::STRICT));
        assert!(lighting_ok(61.0, &Profile::STRICT));
        assert!(!lighting_ok(200.0, &Profile::STRICT));
        assert!(lighting_ok(50.0, &Profile::RELAXED));
    }

    #[test]
    fn test_no_face_clears_positional_signals() {
        let region = TargetRegion::for_frame(640, 480);
        let s = extract_signals(&DetectionFrame::empty(0, 120.0), &region, &Profile::STRICT);
        assert!(!s.face_detected && !s.centered && !s.right_size);
        assert!(!s.all_met());
        assert_eq!(s.avg_ear, 0.0);
    }
}
