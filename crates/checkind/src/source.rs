//! Camera and face detection collaborator.
//!
//! The daemon never talks to a camera driver or inference runtime directly;
//! it drives a [`FrameSource`]. The shipped implementation replays a JSON
//! detection trace, which is also how kiosks are exercised without hardware.

use async_trait::async_trait;
use checkin_core::{DetectionFrame, FaceDetection, TargetRegion};
use image::{Rgb, RgbImage};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::capture::mean_brightness;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found: {0}")]
    NoDevice(String),
    #[error("detection model failed to initialize: {0}")]
    ModelInit(String),
    #[error("frame source not started")]
    NotStarted,
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("still capture failed: {0}")]
    Capture(String),
}

impl SourceError {
    /// Fatal errors halt the gate until an operator intervenes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SourceError::PermissionDenied | SourceError::NoDevice(_) | SourceError::ModelInit(_)
        )
    }
}

/// Frame dimensions reported by a started source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquire the camera and load detection models.
    async fn start(&self) -> Result<FrameSize, SourceError>;
    /// Run detection on the current frame. `face: None` means no face was found.
    async fn detect(&self) -> Result<DetectionFrame, SourceError>;
    /// Grab the current frame as an unmirrored RGB still.
    async fn still(&self) -> Result<RgbImage, SourceError>;
    /// Release the camera. Safe to call when already stopped.
    async fn stop(&self);
}

#[derive(Deserialize)]
struct Trace {
    width: u32,
    height: u32,
    /// Image returned by `still()`; a flat grey frame is synthesized when absent.
    #[serde(default)]
    still: Option<PathBuf>,
    frames: Vec<TraceFrame>,
}

#[derive(Deserialize)]
struct TraceFrame {
    timestamp_ms: u64,
    /// Sampled from the still image when absent.
    #[serde(default)]
    brightness: Option<f32>,
    #[serde(default)]
    face: Option<FaceDetection>,
}

struct Loaded {
    size: FrameSize,
    still: RgbImage,
    frames: Vec<DetectionFrame>,
    cursor: usize,
}

/// Replays a recorded detection trace. Once the trace is exhausted the last
/// frame is repeated, as if the subject held still.
pub struct ReplaySource {
    path: PathBuf,
    state: Mutex<Option<Loaded>>,
}

impl ReplaySource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<Loaded, SourceError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                SourceError::PermissionDenied
            } else {
                SourceError::NoDevice(format!("{}: {e}", self.path.display()))
            }
        })?;
        let trace: Trace = serde_json::from_slice(&raw)
            .map_err(|e| SourceError::ModelInit(format!("invalid trace: {e}")))?;

        if trace.width == 0 || trace.height == 0 {
            return Err(SourceError::ModelInit("trace has zero frame size".into()));
        }

        let still = match &trace.still {
            Some(rel) => {
                let path = match self.path.parent() {
                    Some(dir) if rel.is_relative() => dir.join(rel),
                    _ => rel.clone(),
                };
                let img = tokio::task::spawn_blocking(move || image::open(&path))
                    .await
                    .map_err(|e| SourceError::Capture(e.to_string()))?
                    .map_err(|e| SourceError::NoDevice(format!("still image: {e}")))?;
                img.to_rgb8()
            }
            None => RgbImage::from_pixel(trace.width, trace.height, Rgb([128, 128, 128])),
        };

        if still.dimensions() != (trace.width, trace.height) {
            return Err(SourceError::ModelInit(format!(
                "still image is {}x{}, trace declares {}x{}",
                still.width(),
                still.height(),
                trace.width,
                trace.height
            )));
        }

        let region = TargetRegion::for_frame(trace.width, trace.height);
        let sampled = mean_brightness(&still, &region);
        let frames = trace
            .frames
            .into_iter()
            .map(|f| DetectionFrame {
                timestamp_ms: f.timestamp_ms,
                brightness: f.brightness.unwrap_or(sampled),
                face: f.face,
            })
            .collect();

        Ok(Loaded {
            size: FrameSize {
                width: trace.width,
                height: trace.height,
            },
            still,
            frames,
            cursor: 0,
        })
    }
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn start(&self) -> Result<FrameSize, SourceError> {
        let loaded = self.load().await?;
        let size = loaded.size;
        tracing::info!(
            path = %self.path.display(),
            frames = loaded.frames.len(),
            width = size.width,
            height = size.height,
            "replay source started"
        );
        *self.state.lock().await = Some(loaded);
        Ok(size)
    }

    async fn detect(&self) -> Result<DetectionFrame, SourceError> {
        let mut state = self.state.lock().await;
        let loaded = state.as_mut().ok_or(SourceError::NotStarted)?;
        let last = loaded.frames.len().checked_sub(1).ok_or_else(|| {
            SourceError::Detection("trace contains no frames".to_string())
        })?;
        let frame = loaded.frames[loaded.cursor.min(last)].clone();
        loaded.cursor = (loaded.cursor + 1).min(last);
        Ok(frame)
    }

    async fn still(&self) -> Result<RgbImage, SourceError> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|l| l.still.clone())
            .ok_or(SourceError::NotStarted)
    }

    async fn stop(&self) {
        if self.state.lock().await.take().is_some() {
            tracing::info!(path = %self.path.display(), "replay source stopped");
        }
    }
}
