//! `checkin` — operator CLI for the check-in kiosk daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod classify;
mod client;

use client::KioskProxy;

#[derive(Parser)]
#[command(name = "checkin", version, about = "Check-in kiosk control")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus.
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the camera and a new capture session.
    Start {
        /// `appointment` or `emergency`.
        #[arg(long, default_value = "appointment")]
        mode: String,
    },
    /// Stop the camera and cancel the current session.
    Stop,
    /// Discard the current session and its outcome.
    Reset,
    /// Print gate state, signals and outcome.
    Status,
    /// Print outcomes as sessions finish.
    Watch {
        /// Exit after the first outcome.
        #[arg(long)]
        once: bool,
    },
    /// Classify a backend error message without contacting the daemon.
    Classify(classify::Args),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Start { mode } => {
            let id = connect(cli.session).await?.start(&mode).await?;
            println!("session {id} started ({mode})");
        }
        Command::Stop => {
            connect(cli.session).await?.stop().await?;
            println!("stopped");
        }
        Command::Reset => {
            connect(cli.session).await?.reset().await?;
            println!("reset");
        }
        Command::Status => {
            let raw = connect(cli.session).await?.status().await?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Watch { once } => client::watch(&connect(cli.session).await?, once).await?,
        Command::Classify(args) => classify::run(&args)?,
    }

    Ok(())
}

async fn connect(session_bus: bool) -> Result<KioskProxy<'static>> {
    let conn = if session_bus {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;
    KioskProxy::new(&conn)
        .await
        .context("checkind is not reachable")
}
