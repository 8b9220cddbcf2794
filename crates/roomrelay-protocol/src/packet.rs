//! The [`Packet`] sum type and its stable tags.
//!
//! A packet's tag is its position in the enum, so variants are only ever
//! appended. A tag is never reused for a different packet.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::types::{DisconnectCode, JoinStatus, RoomId, RoomLoad, ServerListEntry, TickPlayer};

/// Numeric identifier leading every frame (`u32`, little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketTag(pub u32);

impl PacketTag {
    // Client <-> hub / worker
    pub const PLAYER_NAME_REQUEST: Self = Self(0);
    pub const PLAYER_NAME_RESPONSE: Self = Self(1);
    pub const SERVER_LIST_REQUEST: Self = Self(2);
    pub const SERVER_LIST_RESPONSE: Self = Self(3);
    pub const SERVER_TIME_REQUEST: Self = Self(4);
    pub const SERVER_TIME_RESPONSE: Self = Self(5);
    pub const JOIN_ROOM_REQUEST: Self = Self(6);
    pub const JOIN_ROOM_RESPONSE: Self = Self(7);
    pub const PLAYER_INPUT: Self = Self(8);
    pub const SET_TICK_INTERVAL: Self = Self(9);
    pub const SET_VIEWPORT: Self = Self(10);
    pub const SET_COUNT: Self = Self(11);
    pub const OBJECT_POSITIONS: Self = Self(12);
    pub const DISCONNECT: Self = Self(13);
    pub const TICK_DATA: Self = Self(14);

    // Hub <-> worker
    pub const HUB_HELLO: Self = Self(15);
    pub const WORKER_REGISTER: Self = Self(16);
    pub const WORKER_STATUS: Self = Self(17);
    pub const ROOM_RESERVATION: Self = Self(18);
    pub const WORKER_DRAINING: Self = Self(19);
    pub const WORKER_STOPPED: Self = Self(20);

    /// Whether some [`Packet`] variant carries this tag.
    pub fn is_known(self) -> bool {
        self.0 <= Self::WORKER_STOPPED.0
    }
}

impl fmt::Display for PacketTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Every message that crosses a process boundary.
///
/// Declaration order is the wire tag order: see [`PacketTag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// Client → hub: "give me a display name".
    PlayerNameRequest,
    PlayerNameResponse { name: String },

    /// Client → hub: "which workers exist?"
    ServerListRequest,
    ServerListResponse {
        status: JoinStatus,
        servers: Vec<ServerListEntry>,
    },

    /// Clock sync. `client_time` is echoed back untouched.
    ServerTimeRequest { client_time: u64 },
    ServerTimeResponse { client_time: u64, server_time: u64 },

    /// Client → hub (room `ANY`, ticket 0) or client → worker (the room and
    /// ticket from the hub's answer).
    JoinRoomRequest { room_id: RoomId, ticket: u64 },
    JoinRoomResponse {
        status: JoinStatus,
        player_id: u64,
        room_id: RoomId,
        ticket: u64,
        /// Where to connect next. Empty when answered by the worker itself.
        address: String,
        tick_interval_ms: u32,
    },

    /// Snake steering input. `tick` is the first room tick the heading
    /// applies to; 0 means "the next one".
    PlayerInput { sequence: u32, tick: u64, heading: f32 },
    /// The worker's tick cadence changed.
    SetTickInterval { tick_interval_ms: u32 },
    /// Bounce: resize the shared field.
    SetViewport { size: Vec2 },
    /// Bounce: change the number of objects.
    SetCount { count: u32 },
    /// Bounce: positions of all objects after `tick`.
    ObjectPositions { tick: u64, positions: Vec<Vec2> },

    /// Server → client: the session is over. Always followed by a close.
    Disconnect { reason: DisconnectCode, message: String },

    /// Snake: authoritative state of every player after `tick`.
    TickData { tick: u64, players: Vec<TickPlayer> },

    /// Hub → worker: first packet on a hub link.
    HubHello { hub_name: String },
    /// Worker → hub: answer to `HubHello`.
    WorkerRegister {
        worker_id: u32,
        max_rooms: u32,
        room_capacity: u32,
        tick_interval_ms: u32,
    },
    /// Worker → hub heartbeat.
    WorkerStatus {
        rooms: Vec<RoomLoad>,
        /// Tickets consumed by successful joins since the last heartbeat.
        redeemed: Vec<u64>,
    },
    /// Hub → worker: a client holding `ticket` will join `room_id`.
    RoomReservation { room_id: RoomId, ticket: u64 },
    /// Worker → hub: no new rooms or joins from now on.
    WorkerDraining,
    /// Worker → hub: all rooms closed, about to exit.
    WorkerStopped,
}

impl Packet {
    pub fn tag(&self) -> PacketTag {
        match self {
            Self::PlayerNameRequest => PacketTag::PLAYER_NAME_REQUEST,
            Self::PlayerNameResponse { .. } => PacketTag::PLAYER_NAME_RESPONSE,
            Self::ServerListRequest => PacketTag::SERVER_LIST_REQUEST,
            Self::ServerListResponse { .. } => PacketTag::SERVER_LIST_RESPONSE,
            Self::ServerTimeRequest { .. } => PacketTag::SERVER_TIME_REQUEST,
            Self::ServerTimeResponse { .. } => PacketTag::SERVER_TIME_RESPONSE,
            Self::JoinRoomRequest { .. } => PacketTag::JOIN_ROOM_REQUEST,
            Self::JoinRoomResponse { .. } => PacketTag::JOIN_ROOM_RESPONSE,
            Self::PlayerInput { .. } => PacketTag::PLAYER_INPUT,
            Self::SetTickInterval { .. } => PacketTag::SET_TICK_INTERVAL,
            Self::SetViewport { .. } => PacketTag::SET_VIEWPORT,
            Self::SetCount { .. } => PacketTag::SET_COUNT,
            Self::ObjectPositions { .. } => PacketTag::OBJECT_POSITIONS,
            Self::Disconnect { .. } => PacketTag::DISCONNECT,
            Self::TickData { .. } => PacketTag::TICK_DATA,
            Self::HubHello { .. } => PacketTag::HUB_HELLO,
            Self::WorkerRegister { .. } => PacketTag::WORKER_REGISTER,
            Self::WorkerStatus { .. } => PacketTag::WORKER_STATUS,
            Self::RoomReservation { .. } => PacketTag::ROOM_RESERVATION,
            Self::WorkerDraining => PacketTag::WORKER_DRAINING,
            Self::WorkerStopped => PacketTag::WORKER_STOPPED,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerNameRequest => "PlayerNameRequest",
            Self::PlayerNameResponse { .. } => "PlayerNameResponse",
            Self::ServerListRequest => "ServerListRequest",
            Self::ServerListResponse { .. } => "ServerListResponse",
            Self::ServerTimeRequest { .. } => "ServerTimeRequest",
            Self::ServerTimeResponse { .. } => "ServerTimeResponse",
            Self::JoinRoomRequest { .. } => "JoinRoomRequest",
            Self::JoinRoomResponse { .. } => "JoinRoomResponse",
            Self::PlayerInput { .. } => "PlayerInput",
            Self::SetTickInterval { .. } => "SetTickInterval",
            Self::SetViewport { .. } => "SetViewport",
            Self::SetCount { .. } => "SetCount",
            Self::ObjectPositions { .. } => "ObjectPositions",
            Self::Disconnect { .. } => "Disconnect",
            Self::TickData { .. } => "TickData",
            Self::HubHello { .. } => "HubHello",
            Self::WorkerRegister { .. } => "WorkerRegister",
            Self::WorkerStatus { .. } => "WorkerStatus",
            Self::RoomReservation { .. } => "RoomReservation",
            Self::WorkerDraining => "WorkerDraining",
            Self::WorkerStopped => "WorkerStopped",
        }
    }
}
