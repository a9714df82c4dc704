use checkin_core::Mode;
use tokio::sync::broadcast;
use zbus::interface;
use zbus::object_server::SignalEmitter;

use crate::engine::{EngineError, EngineHandle, SessionOutcome};

pub const BUS_NAME: &str = "io.checkin.Kiosk1";
pub const OBJECT_PATH: &str = "/io/checkin/Kiosk1";

/// D-Bus interface for the kiosk UI.
///
/// Bus name: io.checkin.Kiosk1
/// Object path: /io/checkin/Kiosk1
pub struct KioskService {
    pub engine: EngineHandle,
}

fn failed(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "io.checkin.Kiosk1")]
impl KioskService {
    /// Start the camera in the given mode (`appointment` or `medical-record`).
    ///
    /// Returns the new session ID.
    async fn start(&self, mode: &str) -> zbus::fdo::Result<String> {
        tracing::info!(mode, "start requested");
        let mode: Mode = mode
            .parse()
            .map_err(|e: String| zbus::fdo::Error::InvalidArgs(e))?;
        let id = self.engine.start(mode).await.map_err(|e| {
            tracing::error!(error = %e, "start failed");
            failed(e)
        })?;
        Ok(id.to_string())
    }

    /// Stop the camera and cancel the current session.
    async fn stop(&self) -> zbus::fdo::Result<()> {
        tracing::info!("stop requested");
        self.engine.stop().await.map_err(failed)
    }

    /// Discard the current session and its outcome.
    async fn reset(&self) -> zbus::fdo::Result<()> {
        tracing::info!("reset requested");
        self.engine.reset().await.map_err(failed)
    }

    /// Gate state, latest signals, countdown, feedback and outcome as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(failed)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "halted": status.halted,
            "session": status.session,
        })
        .to_string())
    }

    /// Emitted once per session with the terminal outcome as JSON.
    #[zbus(signal)]
    async fn outcome_ready(emitter: &SignalEmitter<'_>, outcome: &str) -> zbus::Result<()>;
}

/// Relay engine outcomes to the `OutcomeReady` signal until the engine goes away.
pub async fn forward_outcomes(
    conn: zbus::Connection,
    mut outcomes: broadcast::Receiver<SessionOutcome>,
) -> zbus::Result<()> {
    let emitter = SignalEmitter::new(&conn, OBJECT_PATH)?;
    loop {
        let published = match outcomes.recv().await {
            Ok(published) => published,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "outcome relay lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };
        let json = serde_json::to_string(&published)
            .map_err(|e| zbus::Error::Failure(e.to_string()))?;
        KioskService::outcome_ready(&emitter, &json).await?;
        tracing::info!(
            session = %published.session_id,
            scenario = published.outcome.scenario.as_str(),
            "outcome signalled"
        );
    }
}
