//! Wire protocol for roomrelay.
//!
//! This crate defines the "language" clients, hubs and workers speak:
//!
//! - **Packets** ([`Packet`], [`PacketTag`]): one tagged variant per
//!   message kind, each carrying only the fields it needs.
//! - **Codec** ([`Codec`] trait, [`BinaryCodec`]): a deterministic
//!   `bincode` encoding with a `u32` tag followed by fixed-width or
//!   length-prefixed fields.
//! - **Errors** ([`DecodeError`], [`EncodeError`]): everything that can be
//!   wrong with an incoming frame.
//!
//! The protocol layer sits between transport (raw frames) and the worker
//! and hub cores. It knows nothing about connections or rooms.
//!
//! ```text
//! Transport (frames) → Protocol (Packet) → Core (rooms, lobby)
//! ```

mod codec;
mod error;
mod packet;
mod types;

pub use codec::{BinaryCodec, Codec};
pub use error::{DecodeError, EncodeError};
pub use packet::{Packet, PacketTag};
pub use types::{
    DisconnectCode, JoinStatus, RoomId, RoomLoad, RoomStatus, ServerListEntry, TickPlayer,
    UnknownByte,
};

/// 2D vector used by packets and the demo simulations.
pub use glam::Vec2;

/// Wall-clock milliseconds since the Unix epoch, as carried by
/// `ServerTimeResponse::server_time`. A clock before 1970 reads as 0.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
