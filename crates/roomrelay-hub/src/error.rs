//! Error types for the hub.

use roomrelay_protocol::EncodeError;
use roomrelay_transport::TransportError;

use crate::WorkerId;

/// Why the lobby could not place a client or accept a worker message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// Every available worker is full.
    #[error("no worker has a free slot")]
    NoCapacity,

    /// The chosen worker has no live link.
    #[error("{0} is unavailable")]
    WorkerUnavailable(WorkerId),

    /// The id is not in the config, or is disabled there.
    #[error("{0} is not a configured worker")]
    UnknownWorker(WorkerId),
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Binding the listener failed. Fatal at startup.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The hub greeting could not be serialized.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The hub loop has exited; commands can no longer be delivered.
    #[error("hub is stopped")]
    Stopped,
}
