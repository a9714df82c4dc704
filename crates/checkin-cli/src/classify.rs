//! `checkin classify` — run the outcome classifier on a backend error offline.

use anyhow::Result;
use checkin_core::{classify, BackendFailure, Mode, Outcome};

#[derive(clap::Args)]
pub struct Args {
    /// Error message returned by the backend.
    message: String,
    /// Structured error code, if the backend sent one.
    #[arg(long)]
    code: Option<String>,
    /// `appointment` or `emergency`.
    #[arg(long, default_value = "appointment")]
    mode: String,
}

pub fn run(args: &Args) -> Result<()> {
    let outcome = classify_message(args)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn classify_message(args: &Args) -> Result<Outcome> {
    let mode: Mode = args.mode.parse().map_err(anyhow::Error::msg)?;
    let failure = BackendFailure {
        code: args.code.clone(),
        ..BackendFailure::from_message(args.message.clone())
    };
    Ok(classify(mode, Err(failure)))
}
