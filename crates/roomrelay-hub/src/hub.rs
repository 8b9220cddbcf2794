//! The async shell around the hub [`Core`]: listener, worker links, lobby
//! tick and admin commands.

use std::net::SocketAddr;

use roomrelay_tick::{TickConfig, TickScheduler};
use roomrelay_transport::{ClientEvent, ListenerHandle, WebSocketListener};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::links::{LinkSettings, spawn_links};
use crate::{Core, HubConfig, HubError, HubSnapshot, LinkEvent};

/// Admin requests delivered to the lobby loop between ticks.
#[derive(Debug)]
pub enum HubCommand {
    Snapshot(oneshot::Sender<HubSnapshot>),
    /// Stop dialing workers, close every connection and exit.
    Shutdown,
}

/// Entry point for running a hub.
pub struct Hub;

impl Hub {
    /// Binds the client listener, then spawns it, one link task per enabled
    /// worker and the lobby loop.
    ///
    /// # Errors
    /// [`HubError::Transport`] when the endpoint cannot be bound, or
    /// [`HubError::Encode`] when the worker greeting cannot be serialized.
    pub async fn start(config: HubConfig) -> Result<HubHandle, HubError> {
        let config = config.validated();
        let listener = WebSocketListener::bind(&config.endpoint, config.connection()).await?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(64);

        let settings = LinkSettings {
            hub_name: config.hub_name.clone(),
            connection: config.connection(),
            redial: config.worker_status_interval(),
        };
        let links = spawn_links(&config.workers, settings, links_tx)?;
        let listener = listener.spawn(events_tx);

        let scheduler = TickScheduler::new(TickConfig::with_interval(config.lobby_tick()));
        tracing::info!(
            %local_addr,
            hub = %config.hub_name,
            workers = config.workers.len(),
            "hub listening"
        );
        let core = Core::new(config);

        let task = tokio::spawn(run(core, scheduler, events_rx, links_rx, commands_rx, listener, links));
        Ok(HubHandle {
            local_addr,
            commands: commands_tx,
            task,
        })
    }
}

async fn run(
    mut core: Core,
    mut scheduler: TickScheduler,
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
    mut commands: mpsc::Receiver<HubCommand>,
    listener: ListenerHandle,
    mut links: JoinSet<()>,
) {
    loop {
        tokio::select! {
            Some(command) = commands.recv() => match command {
                HubCommand::Snapshot(reply) => {
                    let _ = reply.send(core.snapshot(Instant::now()));
                }
                HubCommand::Shutdown => break,
            },
            _ = scheduler.wait_for_tick() => {
                let from_links: Vec<LinkEvent> =
                    std::iter::from_fn(|| link_events.try_recv().ok()).collect();
                let from_clients: Vec<ClientEvent> =
                    std::iter::from_fn(|| events.try_recv().ok()).collect();
                core.tick(from_links, from_clients, Instant::now());
                scheduler.record_tick_end();
            }
        }
    }

    links.shutdown().await;
    listener.shutdown().await;
    core.disconnect_all();
    tracing::info!(ticks = core.tick_count(), "hub loop exited");
}

/// Controls a running hub.
#[derive(Debug)]
pub struct HubHandle {
    local_addr: SocketAddr,
    commands: mpsc::Sender<HubCommand>,
    task: JoinHandle<()>,
}

impl HubHandle {
    /// The address clients connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A sender for admin commands, for consoles running in other tasks.
    pub fn commands(&self) -> mpsc::Sender<HubCommand> {
        self.commands.clone()
    }

    pub async fn snapshot(&self) -> Result<HubSnapshot, HubError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Snapshot(tx))
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Resolves once the loop has exited, without consuming the handle.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }

    /// Waits for the loop to exit.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "hub task failed");
        }
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(HubCommand::Shutdown).await;
        self.wait().await;
    }
}
