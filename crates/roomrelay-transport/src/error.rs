use std::time::Duration;

use crate::ClientId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listen address could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A socket-level operation failed.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket upgrade was rejected or malformed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The WebSocket upgrade did not finish in time.
    #[error("websocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The client's outbound queue is full; the client is being disconnected.
    #[error("outbound buffer of {0} is full")]
    Backpressure(ClientId),

    /// The connection is already closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(ClientId),
}
