use checkin_core::{
    classify, BackendFailure, CancelReason, CaptureSession, DetectionFrame, Effect, GateEvent,
    Mode, Outcome, SessionId, SessionSnapshot, TargetRegion,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::backend::{submit, VerificationBackend};
use crate::capture::encode_still;
use crate::config::Config;
use crate::source::{FrameSource, SourceError};

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("frame source error: {0}")]
    Source(#[from] SourceError),
    #[error("engine halted: {0}")]
    Halted(String),
    #[error("a capture session is already active")]
    SessionActive,
    #[error("a previous capture is still being verified")]
    CaptureInFlight,
    #[error("engine task exited")]
    ChannelClosed,
}

/// Timing and encoding knobs for the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub detection_interval: Duration,
    pub capture_cooldown: Duration,
    pub request_timeout: Duration,
    pub jpeg_quality: u8,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            detection_interval: config.detection_interval(),
            capture_cooldown: config.capture_cooldown(),
            request_timeout: config.request_timeout(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// Terminal result of one session, published exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub mode: Mode,
    pub outcome: Outcome,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Set after a fatal source error; cleared only by restarting the daemon.
    pub halted: Option<String>,
    pub session: Option<SessionSnapshot>,
}

enum Message {
    Start {
        mode: Mode,
        reply: oneshot::Sender<Result<SessionId, EngineError>>,
    },
    Stop {
        reason: CancelReason,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Detected {
        session: SessionId,
        result: Result<DetectionFrame, SourceError>,
    },
    CountdownTick {
        session: SessionId,
        epoch: u64,
    },
    CaptureFinished {
        session: SessionId,
        outcome: Outcome,
    },
    CooldownElapsed {
        session: SessionId,
    },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Message>,
    outcomes: broadcast::Sender<SessionOutcome>,
}

impl EngineHandle {
    /// Start the camera and a fresh capture session.
    pub async fn start(&self, mode: Mode) -> Result<SessionId, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Start { mode, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Stop the camera and cancel the current session. Idempotent.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.stop_with(CancelReason::CameraStopped).await
    }

    /// Stop and discard the current session so a new one can start.
    pub async fn reset(&self) -> Result<(), EngineError> {
        self.stop_with(CancelReason::SessionReset).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Receive every terminal outcome published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionOutcome> {
        self.outcomes.subscribe()
    }

    async fn stop_with(&self, reason: CancelReason) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Stop { reason, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn send(&self, msg: Message) -> Result<(), EngineError> {
        self.tx.send(msg).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine task.
///
/// The task owns the only [`CaptureSession`]; commands and timer ticks reach
/// it through one mailbox and are applied strictly one at a time.
pub fn spawn_engine(
    settings: EngineSettings,
    source: Arc<dyn FrameSource>,
    backend: Arc<dyn VerificationBackend>,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel(32);
    let (outcomes, _) = broadcast::channel(8);

    let engine = Engine {
        settings,
        source,
        backend,
        tx: tx.clone(),
        outcomes: outcomes.clone(),
        started_at: Instant::now(),
        session: None,
        detection: None,
        countdown: None,
        cooldown: None,
        pending: None,
        halted: None,
    };
    tokio::spawn(engine.run(rx));

    EngineHandle { tx, outcomes }
}

/// Submission that has left the session and not come back yet.
struct PendingCapture {
    session: SessionId,
    mode: Mode,
}

struct Engine {
    settings: EngineSettings,
    source: Arc<dyn FrameSource>,
    backend: Arc<dyn VerificationBackend>,
    tx: mpsc::Sender<Message>,
    outcomes: broadcast::Sender<SessionOutcome>,
    started_at: Instant,
    session: Option<CaptureSession>,
    // Dropping a guard cancels its timer task.
    detection: Option<DropGuard>,
    countdown: Option<DropGuard>,
    cooldown: Option<DropGuard>,
    pending: Option<PendingCapture>,
    halted: Option<String>,
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        tracing::info!("engine started");
        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
        }
        tracing::info!("engine exiting");
    }

    async fn handle(&mut self, msg: Message) {
        match msg {
            Message::Start { mode, reply } => {
                let result = self.start(mode).await;
                let _ = reply.send(result);
            }
            Message::Stop { reason, reply } => {
                self.stop(reason).await;
                let _ = reply.send(());
            }
            Message::Status { reply } => {
                let _ = reply.send(EngineStatus {
                    halted: self.halted.clone(),
                    session: self.session.as_ref().map(CaptureSession::snapshot),
                });
            }
            Message::Detected { session, result } => {
                let frame = match result {
                    Ok(frame) => frame,
                    Err(e) if e.is_fatal() => {
                        if self.is_current(session) {
                            self.halt(e).await;
                        }
                        return;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "detection failed, treating as no face");
                        DetectionFrame::empty(self.now_ms(), 0.0)
                    }
                };
                self.dispatch(session, GateEvent::Detection(frame));
            }
            Message::CountdownTick { session, epoch } => {
                self.dispatch(session, GateEvent::CountdownTick { epoch });
            }
            Message::CaptureFinished { session, outcome } => match self.pending.take() {
                Some(pending) if pending.session == session => {
                    if self.is_current(session) {
                        self.dispatch(session, GateEvent::CaptureCompleted(outcome));
                    } else {
                        tracing::info!(%session, "capture finished after reset");
                        self.publish(session, pending.mode, outcome);
                    }
                }
                other => {
                    self.pending = other;
                    tracing::debug!(%session, "stale capture result discarded");
                }
            },
            Message::CooldownElapsed { session } => {
                self.cooldown = None;
                self.dispatch(session, GateEvent::CooldownElapsed);
            }
        }
    }

    async fn start(&mut self, mode: Mode) -> Result<SessionId, EngineError> {
        if let Some(reason) = &self.halted {
            return Err(EngineError::Halted(reason.clone()));
        }
        if self.pending.is_some() {
            return Err(EngineError::CaptureInFlight);
        }
        if let Some(session) = &self.session {
            if !session.state().is_terminal() || session.is_capturing() {
                return Err(EngineError::SessionActive);
            }
        }
        self.clear_timers();
        self.session = None;

        let size = match self.source.start().await {
            Ok(size) => size,
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "fatal frame source error, gate halted");
                self.halted = Some(e.to_string());
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame source failed to start");
                return Err(e.into());
            }
        };

        let id = uuid::Uuid::new_v4();
        let region = TargetRegion::for_frame(size.width, size.height);
        let session = CaptureSession::new(id, mode, region);
        tracing::info!(
            session = %id,
            %mode,
            required_blinks = session.profile().required_blinks,
            countdown_secs = session.profile().countdown_secs,
            "capture session started"
        );
        self.session = Some(session);
        self.detection = Some(self.spawn_detection(id));
        Ok(id)
    }

    async fn stop(&mut self, reason: CancelReason) {
        if let Some(session) = self.session.as_mut() {
            let id = session.id();
            let mode = session.mode();
            let effects = session.apply(GateEvent::Cancel(reason));
            for effect in effects {
                self.execute(id, mode, effect);
            }
        }
        self.clear_timers();
        self.source.stop().await;
        if reason == CancelReason::SessionReset {
            self.session = None;
        }
    }

    /// Halt the gate after a fatal source error. Nothing restarts it.
    async fn halt(&mut self, error: SourceError) {
        tracing::error!(error = %error, "fatal frame source error, gate halted");
        self.halted = Some(error.to_string());
        self.stop(CancelReason::Fatal).await;
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    /// Apply one event to the session it was issued for; events for any
    /// other session are stale and dropped.
    fn dispatch(&mut self, id: SessionId, event: GateEvent) {
        let Some(session) = self.session.as_mut().filter(|s| s.id() == id) else {
            tracing::debug!(session = %id, "event for inactive session discarded");
            return;
        };
        let mode = session.mode();
        let effects = session.apply(event);
        for effect in effects {
            self.execute(id, mode, effect);
        }
    }

    fn execute(&mut self, id: SessionId, mode: Mode, effect: Effect) {
        match effect {
            Effect::StartCountdown { epoch } => {
                self.countdown = Some(self.spawn_countdown(id, epoch));
            }
            Effect::CancelCountdown => {
                self.countdown = None;
            }
            Effect::StopDetection => {
                self.detection = None;
            }
            Effect::Capture => self.spawn_capture(id, mode),
            Effect::StartCooldown => {
                self.cooldown = Some(self.spawn_cooldown(id));
            }
            Effect::EmitOutcome(outcome) => self.publish(id, mode, outcome),
        }
    }

    fn publish(&self, id: SessionId, mode: Mode, outcome: Outcome) {
        let published = SessionOutcome {
            session_id: id,
            mode,
            outcome,
            finished_at: chrono::Utc::now().to_rfc3339(),
        };
        if self.outcomes.send(published).is_err() {
            tracing::debug!(session = %id, "no outcome subscribers");
        }
    }

    fn clear_timers(&mut self) {
        self.detection = None;
        self.countdown = None;
        self.cooldown = None;
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Detection loop: one detection in flight at most, ticks that fire
    /// during a slow detection are skipped.
    fn spawn_detection(&self, session: SessionId) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let source = self.source.clone();
        let tx = self.tx.clone();
        let period = self.settings.detection_interval;

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let result = tokio::select! {
                    _ = cancelled.cancelled() => break,
                    result = source.detect() => result,
                };
                if tx.send(Message::Detected { session, result }).await.is_err() {
                    break;
                }
            }
            tracing::trace!(%session, "detection loop ended");
        });

        token.drop_guard()
    }

    fn spawn_countdown(&self, session: SessionId, epoch: u64) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + COUNTDOWN_PERIOD, COUNTDOWN_PERIOD);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if tx
                    .send(Message::CountdownTick { session, epoch })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        token.drop_guard()
    }

    fn spawn_cooldown(&self, session: SessionId) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let cooldown = self.settings.capture_cooldown;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = time::sleep(cooldown) => {
                    let _ = tx.send(Message::CooldownElapsed { session }).await;
                }
            }
        });

        token.drop_guard()
    }

    fn spawn_capture(&mut self, session: SessionId, mode: Mode) {
        self.pending = Some(PendingCapture { session, mode });
        let source = self.source.clone();
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let settings = self.settings;

        tokio::spawn(async move {
            let outcome = capture_and_verify(&*source, &*backend, mode, settings).await;
            let _ = tx.send(Message::CaptureFinished { session, outcome }).await;
        });
    }
}

/// Grab one still, release the camera, submit, and classify the result.
async fn capture_and_verify(
    source: &dyn FrameSource,
    backend: &dyn VerificationBackend,
    mode: Mode,
    settings: EngineSettings,
) -> Outcome {
    let still = source.still().await;
    source.stop().await;

    let result = match still {
        Ok(frame) => match encode_still(&frame, settings.jpeg_quality) {
            Ok(image) => submit(backend, mode, &image, settings.request_timeout).await,
            Err(e) => {
                tracing::error!(error = %e, "still encoding failed");
                Err(BackendFailure::from_message(e.to_string()))
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "still capture failed");
            Err(BackendFailure::from_message(e.to_string()))
        }
    };

    classify(mode, result)
}
