//! Per-tick detection input produced by the face detection provider.

use serde::{Deserialize, Serialize};

/// Fraction of the shorter frame edge used as the target circle radius.
const TARGET_RADIUS_FRACTION: f32 = 0.48;

/// A 2-D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned face bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Mean of width and height.
    pub fn size(&self) -> f32 {
        (self.width + self.height) / 2.0
    }
}

/// A single detected face.
///
/// `left_eye` and `right_eye` hold the six ordered eye-contour points
/// (`p1..p6`) of the 68-point landmark model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub landmarks: Vec<Point>,
    #[serde(default)]
    pub left_eye: Vec<Point>,
    #[serde(default)]
    pub right_eye: Vec<Point>,
}

/// Result of one detection tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Mean luma (0-255) over the target region.
    pub brightness: f32,
    /// `None` when the detector found no face.
    #[serde(default)]
    pub face: Option<FaceDetection>,
}

impl DetectionFrame {
    /// A frame in which nothing was detected.
    pub fn empty(timestamp_ms: u64, brightness: f32) -> Self {
        Self {
            timestamp_ms,
            brightness,
            face: None,
        }
    }
}

/// The on-screen circle the subject is asked to fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRegion {
    pub center: Point,
    pub radius: f32,
}

impl TargetRegion {
    /// Target circle for a frame of the given size: centred, radius 0.48 × shorter edge.
    pub fn for_frame(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            center: Point::new(w / 2.0, h / 2.0),
            radius: w.min(h) * TARGET_RADIUS_FRACTION,
        }
    }

    /// Face size (mean box edge) the subject should present.
    pub fn target_size(&self) -> f32 {
        self.radius * 1.4
    }
}
