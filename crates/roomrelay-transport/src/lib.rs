//! WebSocket transport layer for roomrelay.
//!
//! The transport knows nothing about packets. It accepts WebSocket
//! connections, turns every binary frame into a [`ClientEvent`], and gives
//! the rest of the system two views over each live connection:
//!
//! - [`ConnectedClient`]: the owning view. It holds the socket and is
//!   consumed by its own IO task. Only the transport ever touches it.
//! - [`ClientHandle`]: the slim view. An id, a bounded outbound queue and
//!   a close signal. Cheap to clone, safe to hand to the tick loop.
//!
//! ```text
//! WebSocketListener ──accept──▶ ConnectedClient ──IO task──▶ ClientEvent stream
//!                                      ▲
//!                     ClientHandle ────┘ (send / disconnect)
//! ```

mod client;
mod config;
mod error;
mod websocket;

pub use client::{ClientHandle, ClientOutbox, ConnectedClient};
pub use config::ConnectionConfig;
pub use error::TransportError;
pub use websocket::{DialedClient, ListenerHandle, WebSocketListener, connect};

use std::fmt;

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Process-unique identifier for one connection.
///
/// Ids are handed out from a monotonic counter and never reused, so a stale
/// id can never alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Creates a new `ClientId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a close frame or dropped the socket.
    ClosedByPeer,
    /// Nothing arrived from the peer within the idle window.
    IdleTimeout,
    /// The bounded outbound queue overflowed.
    Backpressure,
    /// The peer broke the protocol (undecodable packet, text frame, ...).
    ProtocolViolation(String),
    /// The server removed the client on purpose (room closed, kicked).
    Kicked(String),
    /// The server is shutting down.
    Shutdown,
    /// Reading or writing the socket failed.
    Transport(String),
}

impl DisconnectReason {
    /// The WebSocket close code sent to the peer for this reason.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::ClosedByPeer => CloseCode::Normal,
            Self::Shutdown => CloseCode::Away,
            Self::IdleTimeout | Self::Backpressure | Self::Kicked(_) => {
                CloseCode::Policy
            }
            Self::ProtocolViolation(_) => CloseCode::Protocol,
            Self::Transport(_) => CloseCode::Error,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClosedByPeer => f.write_str("closed by peer"),
            Self::IdleTimeout => f.write_str("idle timeout"),
            Self::Backpressure => f.write_str("outbound buffer overflow"),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::Kicked(msg) => write!(f, "kicked: {msg}"),
            Self::Shutdown => f.write_str("server shutdown"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Everything the IO layer reports to its owner.
///
/// For every connection the stream carries exactly one `Connected`, any
/// number of `Data`, and exactly one `Disconnected`, in that order.
#[derive(Debug)]
pub enum ClientEvent {
    /// Handshake finished; the handle is ready for sending.
    Connected(ClientHandle),
    /// One binary frame arrived.
    Data { client: ClientId, data: Vec<u8> },
    /// The connection is gone and its resources are released.
    Disconnected {
        client: ClientId,
        reason: DisconnectReason,
    },
}

impl ClientEvent {
    /// The connection this event belongs to.
    pub fn client(&self) -> ClientId {
        match self {
            Self::Connected(handle) => handle.id(),
            Self::Data { client, .. } | Self::Disconnected { client, .. } => {
                *client
            }
        }
    }
}
