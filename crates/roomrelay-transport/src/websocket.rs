//! WebSocket listener and dialer built on `tokio-tungstenite`.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tokio_tungstenite::MaybeTlsStream;

use crate::{ClientEvent, ConnectedClient, ConnectionConfig, TransportError};

/// A connection opened by [`connect`] rather than accepted.
pub type DialedClient = ConnectedClient<MaybeTlsStream<TcpStream>>;

/// Accepts WebSocket upgrades on a bound TCP socket.
pub struct WebSocketListener {
    listener: TcpListener,
    config: ConnectionConfig,
}

impl WebSocketListener {
    /// Binds the listener.
    ///
    /// Bind failure is the one transport error that is fatal: there is no
    /// process without its listener.
    pub async fn bind(addr: &str, config: ConnectionConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(addr, "websocket listener bound");
        Ok(Self { listener, config })
    }

    /// The address the OS actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Starts the accept loop.
    ///
    /// Every connection that completes its handshake is spawned onto its own
    /// IO task reporting into `events`.
    pub fn spawn(self, events: mpsc::UnboundedSender<ClientEvent>) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(self.listener, self.config, events, shutdown_rx));
        ListenerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Controls a running accept loop.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stops accepting, waits for in-flight handshakes to complete or fail,
    /// then returns.
    ///
    /// Connections that already finished their handshake are not touched;
    /// their owner closes them through their handles.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "accept loop task failed");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut handshakes = JoinSet::new();

    loop {
        tokio::select! {
            // A dropped handle counts as a shutdown request.
            _ = shutdown.changed() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::trace!(%addr, "tcp connection accepted");
                    handshakes.spawn(upgrade(stream, addr, config.clone(), events.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    time::sleep(time::Duration::from_millis(50)).await;
                }
            },

            Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
        }
    }

    drop(listener);
    tracing::debug!(in_flight = handshakes.len(), "listener stopped accepting");
    while handshakes.join_next().await.is_some() {}
    tracing::info!("websocket listener shut down");
}

async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let handshake = tokio_tungstenite::accept_async(stream);
    match time::timeout(config.handshake_timeout, handshake).await {
        Ok(Ok(ws)) => {
            let client = ConnectedClient::new(ws, addr, config);
            tracing::debug!(client = %client.id(), %addr, "websocket handshake complete");
            client.spawn(events);
        }
        Ok(Err(e)) => {
            tracing::debug!(%addr, error = %e, "websocket handshake failed");
        }
        Err(_) => {
            tracing::debug!(%addr, "websocket handshake timed out");
        }
    }
}

/// Opens a WebSocket connection to `url` (`ws://host:port`).
///
/// The result is driven exactly like an accepted connection: call
/// [`ConnectedClient::spawn`] to start its IO task.
pub async fn connect(url: &str, config: ConnectionConfig) -> Result<DialedClient, TransportError> {
    let handshake = tokio_tungstenite::connect_async(url);
    let (ws, _response) = time::timeout(config.handshake_timeout, handshake)
        .await
        .map_err(|_| TransportError::HandshakeTimeout(config.handshake_timeout))?
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    let addr = match ws.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.peer_addr()?,
        _ => SocketAddr::from(([0, 0, 0, 0], 0)),
    };
    tracing::debug!(url, %addr, "websocket connection established");
    Ok(ConnectedClient::new(ws, addr, config))
}
