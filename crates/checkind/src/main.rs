use anyhow::{Context, Result};
use checkin_core::Profile;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod backend;
mod capture;
mod config;
mod dbus_interface;
mod engine;
mod source;

use backend::HttpBackend;
use config::Config;
use dbus_interface::{forward_outcomes, KioskService, BUS_NAME, OBJECT_PATH};
use engine::{spawn_engine, EngineSettings};
use source::ReplaySource;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("checkind starting");

    let config = Config::from_env();
    let trace = config
        .frame_trace
        .clone()
        .context("CHECKIN_FRAME_TRACE is not set; no frame source configured")?;
    let source = Arc::new(ReplaySource::new(trace));
    let backend = Arc::new(
        HttpBackend::new(
            &config.backend_url,
            config.api_key.as_deref(),
            config.request_timeout(),
        )
        .context("failed to build verification backend client")?,
    );
    tracing::info!(backend = %config.backend_url, "verification backend configured");

    let engine = spawn_engine(EngineSettings::from(&config), source, backend);

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let conn = builder
        .name(BUS_NAME)?
        .serve_at(
            OBJECT_PATH,
            KioskService {
                engine: engine.clone(),
            },
        )?
        .build()
        .await
        .context("failed to register on D-Bus")?;
    tracing::info!(bus = BUS_NAME, session_bus = config.session_bus, "D-Bus interface registered");

    let relay = tokio::spawn(forward_outcomes(conn.clone(), engine.subscribe()));

    if let Some(mode) = config.auto_start_mode {
        if Profile::for_mode(mode).auto_start {
            match engine.start(mode).await {
                Ok(id) => tracing::info!(session = %id, %mode, "auto-started"),
                Err(e) => tracing::error!(error = %e, %mode, "auto-start failed"),
            }
        } else {
            tracing::warn!(%mode, "profile does not auto-start, waiting for Start");
        }
    }

    tracing::info!("checkind ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("checkind shutting down");
    if let Err(e) = engine.stop().await {
        tracing::warn!(error = %e, "engine stop failed during shutdown");
    }
    relay.abort();

    Ok(())
}
