//! `relay-worker`: hosts rooms for one game.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use roomrelay::config::{self, WorkerFile};
use roomrelay::prelude::*;
use roomrelay::{console, logging};

/// Runs a roomrelay worker.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log filter, overriding RUST_LOG and the config's log_level.
    #[arg(short, long)]
    log: Option<String>,
    /// Accept joins without a hub.
    #[arg(long)]
    standalone: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "worker failed");
            eprintln!("relay-worker: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), RelayError> {
    let mut file: WorkerFile = config::load_or_default(args.config.as_deref())?;
    logging::init(args.log.as_deref(), &file.log_level);

    file.worker.standalone |= args.standalone;
    let shown = config::show(&file);

    let worker_config = file.worker;
    let history = worker_config.input_history();
    let worker = match file.game {
        GameKind::Snake => {
            Worker::start(worker_config, move |_| SnakeGame::with_history(history)).await?
        }
        GameKind::Bounce => Worker::start(worker_config, BounceGame::new).await?,
    };
    tracing::info!(game = %file.game, addr = %worker.local_addr(), "worker started");

    let _console = console::spawn_worker_console(worker.commands(), shown);
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "cannot listen for ctrl-c");
            }
            tracing::info!("interrupted, draining");
        }
        _ = worker.stopped() => {}
    }

    worker.shutdown().await;
    Ok(())
}
