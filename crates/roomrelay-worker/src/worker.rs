//! The async shell around [`Core`]: listener, tick loop, admin commands.

use std::net::SocketAddr;
use std::sync::Arc;

use roomrelay_protocol::RoomId;
use roomrelay_room::RoomLogic;
use roomrelay_tick::{TickConfig, TickScheduler};
use roomrelay_transport::{ClientEvent, ListenerHandle, WebSocketListener};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{Core, WorkerConfig, WorkerError, WorkerSnapshot};

/// Admin requests delivered to the tick loop between ticks.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Refuse new joins, close every room, report to the hub, stop.
    Drain,
    SetTickInterval(u32),
    Snapshot(oneshot::Sender<WorkerSnapshot>),
}

/// Entry point for running a worker.
pub struct Worker;

impl Worker {
    /// Binds the listener, then spawns it and the tick loop.
    ///
    /// `factory` builds the logic for every room this worker creates.
    ///
    /// # Errors
    /// [`WorkerError::Transport`] when the endpoint cannot be bound.
    pub async fn start<L, F>(config: WorkerConfig, factory: F) -> Result<WorkerHandle, WorkerError>
    where
        L: RoomLogic,
        F: Fn(RoomId) -> L + Send + Sync + 'static,
    {
        let config = config.validated();
        let listener = WebSocketListener::bind(&config.endpoint, config.connection()).await?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let listener = listener.spawn(events_tx);

        let scheduler = TickScheduler::new(TickConfig::with_interval(config.tick_interval()));
        let mut core = Core::new(config, Arc::new(factory));
        core.start();
        tracing::info!(
            %local_addr,
            worker = core.config().worker_id,
            standalone = core.config().standalone,
            "worker listening"
        );

        let task = tokio::spawn(run(core, scheduler, events_rx, commands_rx, listener));
        Ok(WorkerHandle {
            local_addr,
            commands: commands_tx,
            task,
        })
    }
}

async fn run<L: RoomLogic>(
    mut core: Core<L>,
    mut scheduler: TickScheduler,
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    mut commands: mpsc::Receiver<WorkerCommand>,
    listener: ListenerHandle,
) {
    loop {
        tokio::select! {
            Some(command) = commands.recv() => match command {
                WorkerCommand::Drain => core.begin_drain(),
                WorkerCommand::SetTickInterval(ms) => {
                    core.set_tick_interval(ms);
                    scheduler.set_interval(core.config().tick_interval());
                }
                WorkerCommand::Snapshot(reply) => {
                    let _ = reply.send(core.snapshot());
                }
            },
            info = scheduler.wait_for_tick() => {
                let batch: Vec<ClientEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
                core.tick(batch, Instant::now(), info.dt);
                scheduler.record_tick_end();
                if core.state() == crate::WorkerState::Stopped {
                    break;
                }
            }
        }
    }

    listener.shutdown().await;
    core.disconnect_all();
    tracing::info!(worker = core.config().worker_id, ticks = core.tick_count(), "worker loop exited");
}

/// Controls a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    local_addr: SocketAddr,
    commands: mpsc::Sender<WorkerCommand>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// The address clients connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A sender for admin commands, for consoles running in other tasks.
    pub fn commands(&self) -> mpsc::Sender<WorkerCommand> {
        self.commands.clone()
    }

    pub async fn command(&self, command: WorkerCommand) -> Result<(), WorkerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WorkerError::Stopped)
    }

    pub async fn snapshot(&self) -> Result<WorkerSnapshot, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.command(WorkerCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| WorkerError::Stopped)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Resolves once the loop has exited, without consuming the handle.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }

    /// Waits for the loop to exit, which happens after a drain completes.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "worker task failed");
        }
    }

    /// Drains and waits for the worker to stop.
    pub async fn shutdown(self) {
        // The loop may already be gone; waiting is still correct then.
        let _ = self.commands.send(WorkerCommand::Drain).await;
        self.wait().await;
    }
}
