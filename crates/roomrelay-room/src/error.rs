//! Error types for the room layer.

use roomrelay_protocol::{JoinStatus, RoomId};
use roomrelay_transport::ClientId;

/// A failure reported by game logic. The room that produced it is faulted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct LogicFault(pub String);

impl LogicFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    /// Every slot is taken.
    #[error("{0} is full")]
    RoomFull(RoomId),

    /// The room is closing or closed and no longer accepts members.
    #[error("{0} is closing")]
    RoomClosing(RoomId),

    #[error("{0} already in {1}")]
    AlreadyInRoom(ClientId, RoomId),

    #[error("{0} not in {1}")]
    NotInRoom(ClientId, RoomId),

    /// Game logic failed. The room must be closed.
    #[error("{room} faulted: {source}")]
    Fault {
        room: RoomId,
        #[source]
        source: LogicFault,
    },
}

impl RoomError {
    /// The status a client sees when its join is refused with this error.
    pub fn join_status(&self) -> JoinStatus {
        match self {
            Self::RoomFull(_) => JoinStatus::RoomFull,
            Self::AlreadyInRoom(..) => JoinStatus::AlreadyInRoom,
            Self::RoomClosing(_) | Self::NotInRoom(..) | Self::Fault { .. } => {
                JoinStatus::RoomClosing
            }
        }
    }
}
