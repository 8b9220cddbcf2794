//! Value types carried inside packets.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifier of a room, unique across the whole hub/worker deployment.
///
/// The hub allocates room ids; a standalone worker allocates its own.
/// `RoomId(0)` is never a real room: in a join request it means "any room".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl RoomId {
    /// Placeholder meaning "no particular room".
    pub const ANY: RoomId = RoomId(0);

    pub fn is_any(self) -> bool {
        self == Self::ANY
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// One-byte enums
// ---------------------------------------------------------------------------

/// A byte that does not name any variant of a one-byte enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} {value}")]
pub struct UnknownByte {
    pub field: &'static str,
    pub value: u8,
}

/// Declares a `u8`-backed enum that travels as a single byte and rejects
/// unknown bytes on decode.
macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "u8", try_from = "u8")]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),*
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = UnknownByte;

            fn try_from(value: u8) -> Result<Self, UnknownByte> {
                match value {
                    $( $value => Ok(Self::$variant), )*
                    value => Err(UnknownByte { field: $field, value }),
                }
            }
        }
    };
}

byte_enum! {
    /// Outcome of a join or list request.
    JoinStatus, "join status" {
        Ok = 0,
        /// The target room has no free slot.
        RoomFull = 1,
        /// The target room is closing or closed.
        RoomClosing = 2,
        /// No worker can take another player.
        NoCapacity = 3,
        /// The ticket does not match a reservation for that room.
        InvalidTicket = 4,
        /// The client is already a member of a room on this worker.
        AlreadyInRoom = 5,
    }
}

byte_enum! {
    /// Why the server is ending a client's session.
    DisconnectCode, "disconnect code" {
        RoomClosed = 0,
        RoomFault = 1,
        ServerShutdown = 2,
        Kicked = 3,
    }
}

byte_enum! {
    /// Lifecycle of a room.
    ///
    /// `Open → Full → Open` follows membership; `Closing → Closed` is one-way.
    RoomStatus, "room status" {
        Open = 0,
        Full = 1,
        Closing = 2,
        Closed = 3,
    }
}

impl RoomStatus {
    /// Whether the room may still gain members.
    pub fn accepts_joins(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the room is on its way out.
    pub fn is_closing(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

// ---------------------------------------------------------------------------
// Compound payloads
// ---------------------------------------------------------------------------

/// One worker as advertised to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerListEntry {
    pub worker_id: u32,
    pub name: String,
    /// Short region/flag code (for example `"pl"`).
    pub flag: String,
    /// WebSocket address clients connect to.
    pub address: String,
    pub rooms: u32,
    pub max_rooms: u32,
    pub players: u32,
    pub available: bool,
}

/// Occupancy of one room, reported by a worker in its heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomLoad {
    pub room_id: RoomId,
    pub players: u32,
    pub capacity: u32,
    pub status: RoomStatus,
}

/// One snake in a [`Packet::TickData`](crate::Packet::TickData) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickPlayer {
    pub player_id: u64,
    pub heading: f32,
    pub nodes: Vec<glam::Vec2>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_display_and_any() {
        assert_eq!(RoomId(3).to_string(), "room-3");
        assert!(RoomId::ANY.is_any());
        assert!(!RoomId(1).is_any());
    }

    #[test]
    fn test_room_status_predicates() {
        assert!(RoomStatus::Open.accepts_joins());
        assert!(!RoomStatus::Full.accepts_joins());
        assert!(RoomStatus::Closing.is_closing());
        assert!(RoomStatus::Closed.is_closing());
        assert!(!RoomStatus::Full.is_closing());
    }

    #[test]
    fn test_byte_enum_conversions() {
        assert_eq!(u8::from(JoinStatus::InvalidTicket), 4);
        assert_eq!(DisconnectCode::try_from(2), Ok(DisconnectCode::ServerShutdown));
        assert_eq!(
            JoinStatus::try_from(9),
            Err(UnknownByte { field: "join status", value: 9 })
        );
        assert_eq!(
            UnknownByte { field: "room status", value: 7 }.to_string(),
            "invalid room status 7"
        );
    }
}
