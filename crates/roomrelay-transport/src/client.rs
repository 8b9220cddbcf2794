//! Owning and slim views over a single WebSocket connection.
//!
//! A [`ConnectedClient`] is created once per successful handshake and moved
//! into its IO task. Everything else in the process talks to the connection
//! through [`ClientHandle`], which only carries the id, a bounded outbound
//! queue, a close signal and an RTT gauge. The handle never owns the socket,
//! so passing it across tick boundaries cannot leak or stall IO.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use crate::{ClientEvent, ClientId, ConnectionConfig, DisconnectReason, TransportError};

/// Counter for generating unique client ids.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Sentinel stored in the RTT gauge until the first pong arrives.
const RTT_UNKNOWN: u32 = u32::MAX;

pub(crate) fn next_client_id() -> ClientId {
    ClientId::new(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

// ---------------------------------------------------------------------------
// ClientHandle (slim view)
// ---------------------------------------------------------------------------

/// Lightweight, cloneable reference to a live connection.
///
/// `send` never waits: frames go into a bounded queue drained by the IO
/// task. A client that cannot keep up is disconnected instead of blocking
/// the caller.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    addr: SocketAddr,
    outbound: mpsc::Sender<Vec<u8>>,
    close: Arc<watch::Sender<Option<DisconnectReason>>>,
    rtt_ms: Arc<AtomicU32>,
}

impl ClientHandle {
    /// Creates a handle that is not attached to a socket, together with the
    /// receiving side of its queues.
    ///
    /// The IO task uses this to build every connection; tests use it to
    /// observe exactly what the tick loop would have written.
    pub fn detached(
        id: ClientId,
        addr: SocketAddr,
        outbound_buffer: usize,
    ) -> (Self, ClientOutbox) {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_buffer.max(1));
        let (close_tx, close_rx) = watch::channel(None);
        let handle = Self {
            id,
            addr,
            outbound: outbound_tx,
            close: Arc::new(close_tx),
            rtt_ms: Arc::new(AtomicU32::new(RTT_UNKNOWN)),
        };
        let outbox = ClientOutbox {
            outbound: outbound_rx,
            close: close_rx,
        };
        (handle, outbox)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Remote address of the peer.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues one binary frame for the peer.
    ///
    /// # Errors
    /// - [`TransportError::Backpressure`] when the queue is full. The client
    ///   has already been told to disconnect when this is returned.
    /// - [`TransportError::ConnectionClosed`] when the IO task is gone.
    pub fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        if self.is_closing() {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        match self.outbound.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client = %self.id, "outbound buffer full, disconnecting");
                self.disconnect(DisconnectReason::Backpressure);
                Err(TransportError::Backpressure(self.id))
            }
            Err(TrySendError::Closed(_)) => {
                Err(TransportError::ConnectionClosed(self.id))
            }
        }
    }

    /// Asks the IO task to close the connection.
    ///
    /// Frames queued before this call are still written before the close
    /// frame. Only the first reason sticks; later calls are no-ops.
    pub fn disconnect(&self, reason: DisconnectReason) {
        self.close.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    /// `true` once a disconnect has been requested.
    pub fn is_closing(&self) -> bool {
        self.close.borrow().is_some()
    }

    /// Last measured round-trip time, if a pong has been seen.
    pub fn rtt(&self) -> Option<Duration> {
        match self.rtt_ms.load(Ordering::Relaxed) {
            RTT_UNKNOWN => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        }
    }

    fn record_rtt(&self, rtt: Duration) {
        let ms = u32::try_from(rtt.as_millis()).unwrap_or(RTT_UNKNOWN - 1);
        self.rtt_ms.store(ms.min(RTT_UNKNOWN - 1), Ordering::Relaxed);
    }
}

/// Receiving side of a [`ClientHandle`]'s queues.
#[derive(Debug)]
pub struct ClientOutbox {
    outbound: mpsc::Receiver<Vec<u8>>,
    close: watch::Receiver<Option<DisconnectReason>>,
}

impl ClientOutbox {
    /// Pops the next queued frame, if any.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.outbound.try_recv().ok()
    }

    /// Pops every queued frame.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// The reason passed to [`ClientHandle::disconnect`], if it was called.
    pub fn close_reason(&self) -> Option<DisconnectReason> {
        self.close.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// ConnectedClient (owning view)
// ---------------------------------------------------------------------------

/// An accepted (or dialed) WebSocket connection, before its IO task starts.
pub struct ConnectedClient<S = TcpStream> {
    handle: ClientHandle,
    ws: WebSocketStream<S>,
    outbox: ClientOutbox,
    config: ConnectionConfig,
}

impl<S> ConnectedClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        ws: WebSocketStream<S>,
        addr: SocketAddr,
        config: ConnectionConfig,
    ) -> Self {
        let (handle, outbox) =
            ClientHandle::detached(next_client_id(), addr, config.outbound_buffer);
        Self {
            handle,
            ws,
            outbox,
            config,
        }
    }

    pub fn id(&self) -> ClientId {
        self.handle.id()
    }

    /// A slim handle to this connection.
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Moves the connection into its IO task.
    ///
    /// The task reports `Connected` first and always reports exactly one
    /// `Disconnected`, whichever way it exits.
    pub fn spawn(self, events: mpsc::UnboundedSender<ClientEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    async fn run(self, events: mpsc::UnboundedSender<ClientEvent>) {
        let Self {
            handle,
            ws,
            outbox,
            config,
        } = self;
        let ClientOutbox {
            outbound: mut outbound_rx,
            close: mut close_rx,
        } = outbox;
        let id = handle.id();

        let _ = events.send(ClientEvent::Connected(handle.clone()));
        let mut guard = DisconnectGuard {
            client: id,
            events,
            reason: None,
        };

        let (mut sink, mut stream) = ws.split();
        let mut last_seen = Instant::now();
        let mut ping_sent: Option<Instant> = None;
        let mut ping = time::interval_at(
            Instant::now() + config.ping_interval,
            config.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Every write is bounded by the idle timeout: a peer that stops
        // reading is dropped instead of parking this task forever.
        let write_limit = config.idle_timeout;

        let reason = loop {
            tokio::select! {
                // Queued frames win over the close signal so that anything
                // enqueued before `disconnect` still reaches the peer.
                biased;

                Some(data) = outbound_rx.recv() => {
                    let frame = Message::Binary(data.into());
                    if let Err(reason) = send_within(&mut sink, frame, write_limit).await {
                        break requested_or(&close_rx, reason);
                    }
                }

                Ok(()) = close_rx.changed() => {
                    let requested = close_rx.borrow_and_update().clone();
                    let Some(reason) = requested else { continue };
                    let flushed = time::timeout(write_limit, async {
                        while let Ok(data) = outbound_rx.try_recv() {
                            sink.send(Message::Binary(data.into())).await?;
                        }
                        sink.send(close_frame(&reason)).await
                    })
                    .await;
                    if !matches!(flushed, Ok(Ok(()))) {
                        tracing::debug!(client = %id, "close handshake abandoned");
                    }
                    break reason;
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Binary(data))) => {
                        last_seen = Instant::now();
                        let _ = guard.events.send(ClientEvent::Data {
                            client: id,
                            data: data.into(),
                        });
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                        if let Some(sent) = ping_sent.take() {
                            handle.record_rtt(sent.elapsed());
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Frame(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Text(_))) => {
                        let reason = DisconnectReason::ProtocolViolation(
                            "text frames are not accepted".into(),
                        );
                        let _ = send_within(&mut sink, close_frame(&reason), write_limit).await;
                        break reason;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break DisconnectReason::ClosedByPeer;
                    }
                    Some(Err(e)) => break DisconnectReason::Transport(e.to_string()),
                },

                _ = ping.tick() => {
                    let ping = Message::Ping(Vec::new().into());
                    if let Err(reason) = send_within(&mut sink, ping, write_limit).await {
                        break requested_or(&close_rx, reason);
                    }
                    ping_sent = Some(Instant::now());
                }

                _ = time::sleep_until(last_seen + config.idle_timeout) => {
                    let reason = DisconnectReason::IdleTimeout;
                    let _ = send_within(&mut sink, close_frame(&reason), write_limit).await;
                    break reason;
                }
            }
        };

        tracing::debug!(client = %id, %reason, "connection closed");
        handle.disconnect(reason.clone());
        guard.reason = Some(reason);
    }
}

/// Writes one message, giving up after `limit`. A write that cannot finish
/// in time means the peer is not reading.
async fn send_within<Si>(sink: &mut Si, message: Message, limit: Duration) -> Result<(), DisconnectReason>
where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    match time::timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DisconnectReason::Transport(e.to_string())),
        Err(_) => Err(DisconnectReason::Backpressure),
    }
}

/// The reason already requested through the handle, if any, wins over the
/// local failure.
fn requested_or(
    close_rx: &watch::Receiver<Option<DisconnectReason>>,
    fallback: DisconnectReason,
) -> DisconnectReason {
    close_rx.borrow().clone().unwrap_or(fallback)
}

fn close_frame(reason: &DisconnectReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.close_code(),
        reason: reason.to_string().into(),
    }))
}

/// Reports `Disconnected` when the IO task ends, including on panic or abort.
struct DisconnectGuard {
    client: ClientId,
    events: mpsc::UnboundedSender<ClientEvent>,
    reason: Option<DisconnectReason>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let reason = self
            .reason
            .take()
            .unwrap_or_else(|| DisconnectReason::Transport("io task aborted".into()));
        let _ = self.events.send(ClientEvent::Disconnected {
            client: self.client,
            reason,
        });
    }
}
