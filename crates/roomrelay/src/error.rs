//! Unified error type for roomrelay.

use roomrelay_hub::{HubError, LobbyError};
use roomrelay_protocol::{DecodeError, EncodeError};
use roomrelay_room::RoomError;
use roomrelay_transport::TransportError;
use roomrelay_worker::WorkerError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The binaries deal with this single type; `?` converts from each
/// sub-crate error through the generated `From` impls.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Hub(#[from] HubError),

    /// A config file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
