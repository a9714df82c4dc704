//! Liveness gate, capture scheduling state and outcome classification for the
//! check-in kiosk.
//!
//! This crate is synchronous and I/O free. The daemon feeds it detection
//! frames and timer ticks through [`CaptureSession::apply`] and carries out
//! the returned [`Effect`]s.

pub mod blink;
pub mod feedback;
pub mod frame;
pub mod gate;
pub mod outcome;
pub mod profile;
pub mod signals;

pub use blink::{BlinkDebouncer, BlinkState};
pub use feedback::Feedback;
pub use frame::{BoundingBox, DetectionFrame, FaceDetection, Point, TargetRegion};
pub use gate::{
    CancelReason, CaptureSession, Effect, GateEvent, GateState, SessionId, SessionSnapshot,
};
pub use outcome::{
    classify, ArrivalVerification, BackendFailure, MedicalRecordLookup, Outcome, OutcomeStatus,
    Scenario, VerificationResponse,
};
pub use profile::{Mode, Profile};
pub use signals::{eye_aspect_ratio, extract_signals, LivenessSignals};
