//! Outbound links from the hub to its workers.
//!
//! One task per enabled worker dials the worker's listener, introduces the
//! hub with `HubHello` and forwards every transport event to the hub core,
//! tagged with the worker id. When the link drops the task waits one
//! status interval and dials again, forever. Aborting the task set stops
//! the dialing; live connections are closed by the core.

use std::time::Duration;

use roomrelay_protocol::{BinaryCodec, Codec, EncodeError, Packet};
use roomrelay_transport::{ClientEvent, ConnectionConfig, connect};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time;

use crate::{WorkerEntryConfig, WorkerId};

/// A transport event on the link to one worker.
pub type LinkEvent = (WorkerId, ClientEvent);

pub(crate) struct LinkSettings {
    pub hub_name: String,
    pub connection: ConnectionConfig,
    pub redial: Duration,
}

/// Spawns one dialing task per enabled worker.
///
/// # Errors
/// [`EncodeError`] if the greeting cannot be serialized.
pub(crate) fn spawn_links(
    workers: &[WorkerEntryConfig],
    settings: LinkSettings,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> Result<JoinSet<()>, EncodeError> {
    let hello = BinaryCodec.encode(&Packet::HubHello {
        hub_name: settings.hub_name.clone(),
    })?;
    let mut links = JoinSet::new();
    for worker in workers.iter().filter(|w| w.enabled) {
        links.spawn(run_link(
            worker.id,
            worker.url(),
            hello.clone(),
            settings.connection.clone(),
            settings.redial,
            events.clone(),
        ));
    }
    Ok(links)
}

async fn run_link(
    worker: WorkerId,
    url: String,
    hello: Vec<u8>,
    connection: ConnectionConfig,
    redial: Duration,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    loop {
        match connect(&url, connection.clone()).await {
            Ok(dialed) => {
                tracing::info!(%worker, %url, "worker link up");
                if let Err(e) = dialed.handle().send(hello.clone()) {
                    tracing::warn!(%worker, error = %e, "hello not queued");
                }
                let (tx, mut rx) = mpsc::unbounded_channel();
                let io = dialed.spawn(tx);
                while let Some(event) = rx.recv().await {
                    let down = matches!(event, ClientEvent::Disconnected { .. });
                    if events.send((worker, event)).is_err() {
                        // The hub loop is gone.
                        io.abort();
                        return;
                    }
                    if down {
                        break;
                    }
                }
                let _ = io.await;
                tracing::warn!(%worker, "worker link down");
            }
            Err(e) => {
                tracing::debug!(%worker, %url, error = %e, "worker dial failed");
            }
        }
        time::sleep(redial).await;
    }
}
