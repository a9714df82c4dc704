//! D-Bus client for checkind.

use anyhow::Result;
use futures::StreamExt;

#[zbus::proxy(
    interface = "io.checkin.Kiosk1",
    default_service = "io.checkin.Kiosk1",
    default_path = "/io/checkin/Kiosk1"
)]
pub trait Kiosk {
    fn start(&self, mode: &str) -> zbus::Result<String>;
    fn stop(&self) -> zbus::Result<()>;
    fn reset(&self) -> zbus::Result<()>;
    fn status(&self) -> zbus::Result<String>;

    #[zbus(signal)]
    fn outcome_ready(&self, outcome: &str) -> zbus::Result<()>;
}

/// Print each `OutcomeReady` signal as pretty JSON.
pub async fn watch(kiosk: &KioskProxy<'_>, once: bool) -> Result<()> {
    let mut stream = kiosk.receive_outcome_ready().await?;
    eprintln!("waiting for outcomes...");
    while let Some(signal) = stream.next().await {
        let args = signal.args()?;
        let value: serde_json::Value = serde_json::from_str(args.outcome())?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        if once {
            break;
        }
    }
    Ok(())
}
