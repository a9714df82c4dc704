//! Liveness gate: the single owner of per-session capture state.
//!
//! All mutation goes through [`CaptureSession::apply`], which consumes one
//! [`GateEvent`] at a time and returns the [`Effect`]s the runtime must carry
//! out (start or cancel the countdown timer, capture a still, emit the
//! outcome). Detection ticks and countdown ticks are therefore never able to
//! interleave their effects, whatever thread or task delivers them.
//!
//! ```text
//!   Searching --face--> Adjusting --all requirements--> Ready --> CountingDown
//!       ^                   ^                                        |   |
//!       |                   +---------- requirement lost ------------+   |
//!       +------------- no face (any non-terminal state)                  |
//!                                          countdown expired, still met  v
//!                                                                     Captured
//! ```
//!
//! `Captured` and `Cancelled` are terminal; capturing again needs a new session.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::blink::BlinkDebouncer;
use crate::feedback::Feedback;
use crate::frame::{DetectionFrame, TargetRegion};
use crate::outcome::Outcome;
use crate::profile::{Mode, Profile};
use crate::signals::{extract_signals, LivenessSignals};

pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Searching,
    Adjusting,
    Ready,
    CountingDown,
    Captured,
    Cancelled,
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::Captured | GateState::Cancelled)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateState::Searching => "searching",
            GateState::Adjusting => "adjusting",
            GateState::Ready => "ready",
            GateState::CountingDown => "counting_down",
            GateState::Captured => "captured",
            GateState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    CameraStopped,
    SessionReset,
    Fatal,
}

#[derive(Debug, Clone)]
pub enum GateEvent {
    /// Result of one detection tick.
    Detection(DetectionFrame),
    /// One-second countdown tick from the timer started with `epoch`.
    CountdownTick { epoch: u64 },
    /// The verification call returned (successfully or not).
    CaptureCompleted(Outcome),
    /// The post-capture cooldown window has passed.
    CooldownElapsed,
    Cancel(CancelReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a one-second countdown ticker tagged with `epoch`.
    StartCountdown { epoch: u64 },
    /// Dispose the running countdown ticker, if any.
    CancelCountdown,
    /// Stop the detection ticker.
    StopDetection,
    /// Grab one mirrored still and submit it for verification.
    Capture,
    /// Start the cooldown that eventually delivers [`GateEvent::CooldownElapsed`].
    StartCooldown,
    /// Publish the terminal outcome.
    EmitOutcome(Outcome),
}

/// One camera session: profile, gate state, blink progress and countdown.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    id: SessionId,
    mode: Mode,
    profile: Profile,
    region: TargetRegion,
    state: GateState,
    blink: BlinkDebouncer,
    countdown_remaining: u32,
    countdown_epoch: u64,
    capturing: bool,
    submissions: u32,
    signals: Option<LivenessSignals>,
    feedback: Feedback,
    outcome: Option<Outcome>,
}

impl CaptureSession {
    pub fn new(id: SessionId, mode: Mode, region: TargetRegion) -> Self {
        Self::with_profile(id, mode, Profile::for_mode(mode), region)
    }

    pub fn with_profile(id: SessionId, mode: Mode, profile: Profile, region: TargetRegion) -> Self {
        Self {
            id,
            mode,
            profile,
            region,
            state: GateState::Searching,
            blink: BlinkDebouncer::new(profile.required_blinks),
            countdown_remaining: profile.countdown_secs,
            countdown_epoch: 0,
            capturing: false,
            submissions: 0,
            signals: None,
            feedback: Feedback::Initializing,
            outcome: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn blink_count(&self) -> u32 {
        self.blink.count()
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// A still has been submitted and its result has not come back yet.
    pub fn submission_pending(&self) -> bool {
        self.submissions > 0 && self.outcome.is_none()
    }

    /// Number of capture submissions started by this session (0 or 1).
    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn signals(&self) -> Option<&LivenessSignals> {
        self.signals.as_ref()
    }

    pub fn feedback(&self) -> Feedback {
        self.feedback
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Every requirement of the profile holds on the latest frame.
    pub fn requirements_met(&self) -> bool {
        self.signals.map_or(false, |s| s.all_met()) && self.blink.has_blinked()
    }

    /// Apply one event and return the effects the runtime must perform.
    pub fn apply(&mut self, event: GateEvent) -> Vec<Effect> {
        match event {
            GateEvent::Detection(frame) => self.on_detection(frame),
            GateEvent::CountdownTick { epoch } => self.on_countdown_tick(epoch),
            GateEvent::CaptureCompleted(outcome) => self.on_capture_completed(outcome),
            GateEvent::CooldownElapsed => {
                self.capturing = false;
                Vec::new()
            }
            GateEvent::Cancel(reason) => self.on_cancel(reason),
        }
    }

    fn on_detection(&mut self, frame: DetectionFrame) -> Vec<Effect> {
        if self.state.is_terminal() {
            tracing::trace!(session = %self.id, state = %self.state, "detection after terminal state ignored");
            return Vec::new();
        }

        let signals = extract_signals(&frame, &self.region, &self.profile);
        self.signals = Some(signals);
        let mut effects = Vec::new();

        if !signals.face_detected {
            self.blink.reset();
            if self.state == GateState::CountingDown {
                tracing::info!(session = %self.id, "face lost, countdown cancelled");
                effects.push(Effect::CancelCountdown);
            }
            self.reset_countdown();
            self.feedback = Feedback::NoFace;
            self.transition(GateState::Searching);
            return effects;
        }

        if signals.positioned() {
            if self.profile.blinks_enabled() {
                self.blink.update(signals.avg_ear, frame.timestamp_ms);
            }
        } else {
            self.blink.reset();
        }

        self.feedback =
            Feedback::for_signals(&signals, self.profile.brightness_low, self.blink.remaining());

        if self.state == GateState::Searching {
            self.transition(GateState::Adjusting);
        }

        if self.requirements_met() {
            if self.state == GateState::Adjusting {
                self.transition(GateState::Ready);
            }
            if self.state == GateState::Ready && !self.capturing {
                self.countdown_epoch += 1;
                self.countdown_remaining = self.profile.countdown_secs;
                self.transition(GateState::CountingDown);
                effects.push(Effect::StartCountdown {
                    epoch: self.countdown_epoch,
                });
            }
        } else {
            if self.state == GateState::CountingDown {
                tracing::info!(
                    session = %self.id,
                    feedback = %self.feedback,
                    "requirement lost, countdown cancelled"
                );
                effects.push(Effect::CancelCountdown);
            }
            self.reset_countdown();
            self.transition(GateState::Adjusting);
        }

        effects
    }

    fn on_countdown_tick(&mut self, epoch: u64) -> Vec<Effect> {
        if self.state != GateState::CountingDown || epoch != self.countdown_epoch {
            tracing::debug!(
                session = %self.id,
                epoch,
                current = self.countdown_epoch,
                state = %self.state,
                "stale countdown tick ignored"
            );
            return Vec::new();
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        tracing::debug!(session = %self.id, remaining = self.countdown_remaining, "countdown tick");
        if self.countdown_remaining > 0 {
            return Vec::new();
        }

        let mut effects = vec![Effect::CancelCountdown];
        if self.requirements_met() {
            effects.extend(self.begin_capture());
        } else {
            self.reset_countdown();
            self.transition(GateState::Adjusting);
        }
        effects
    }

    /// Single-flight check-and-set around the capture submission.
    fn begin_capture(&mut self) -> Vec<Effect> {
        if self.capturing || self.submissions > 0 {
            tracing::debug!(session = %self.id, "capture already in flight, trigger ignored");
            return Vec::new();
        }
        self.capturing = true;
        self.submissions += 1;
        self.transition(GateState::Captured);
        vec![Effect::StopDetection, Effect::Capture]
    }

    fn on_capture_completed(&mut self, outcome: Outcome) -> Vec<Effect> {
        if self.state != GateState::Captured || self.outcome.is_some() {
            tracing::debug!(session = %self.id, state = %self.state, "late capture result ignored");
            return Vec::new();
        }
        tracing::info!(
            session = %self.id,
            scenario = outcome.scenario.as_str(),
            status = ?outcome.status,
            "capture outcome"
        );
        self.outcome = Some(outcome.clone());
        vec![Effect::EmitOutcome(outcome), Effect::StartCooldown]
    }

    fn on_cancel(&mut self, reason: CancelReason) -> Vec<Effect> {
        if self.state == GateState::Cancelled {
            return Vec::new();
        }
        tracing::info!(session = %self.id, ?reason, state = %self.state, "session cancelled");
        // A submission already sent stays single-flight until its result lands.
        if !self.submission_pending() {
            self.capturing = false;
        }
        self.blink.reset();
        self.reset_countdown();
        if self.state != GateState::Captured {
            self.transition(GateState::Cancelled);
        }
        vec![Effect::CancelCountdown, Effect::StopDetection]
    }

    fn reset_countdown(&mut self) {
        self.countdown_remaining = self.profile.countdown_secs;
    }

    fn transition(&mut self, next: GateState) {
        if self.state != next {
            tracing::info!(session = %self.id, from = %self.state, to = %next, "gate transition");
            self.state = next;
        }
    }

    /// Serializable view for the UI.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            mode: self.mode,
            state: self.state,
            signals: self.signals,
            blink_count: self.blink.count(),
            blinks_required: self.blink.required(),
            countdown_remaining: self.countdown_remaining,
            feedback: self.feedback.to_string(),
            outcome: self.outcome.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub mode: Mode,
    pub state: GateState,
    pub signals: Option<LivenessSignals>,
    pub blink_count: u32,
    pub blinks_required: u32,
    pub countdown_remaining: u32,
    pub feedback: String,
    pub outcome: Option<Outcome>,
}
