//! `relay-hub`: matchmaking front door for a set of workers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use roomrelay::config::{self, HubFile};
use roomrelay::prelude::*;
use roomrelay::{console, logging};

/// Runs a roomrelay hub.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file listing the workers. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log filter, overriding RUST_LOG and the config's log_level.
    #[arg(short, long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "hub failed");
            eprintln!("relay-hub: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), RelayError> {
    let file: HubFile = config::load_or_default(args.config.as_deref())?;
    logging::init(args.log.as_deref(), &file.log_level);

    if file.hub.workers.is_empty() {
        tracing::warn!("no workers configured, every join will be refused");
    }
    let shown = config::show(&file);
    let hub = Hub::start(file.hub).await?;

    let _console = console::spawn_hub_console(hub.commands(), shown);
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "cannot listen for ctrl-c");
            }
            tracing::info!("interrupted, shutting down");
        }
        _ = hub.stopped() => {}
    }

    hub.shutdown().await;
    Ok(())
}
