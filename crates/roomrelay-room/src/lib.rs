//! Rooms for roomrelay workers.
//!
//! A room is a fixed-capacity group of clients sharing one simulation. Rooms
//! are plain synchronous values owned by the worker's tick loop: nothing in
//! here spawns a task or touches a socket. The worker feeds a room joins,
//! leaves and inputs between ticks, calls [`Room::tick`] once per tick, and
//! flushes the returned [`QueuePacket`]s to the transport.
//!
//! # Key types
//!
//! - [`RoomLogic`]: the trait a game implements
//! - [`Room`]: membership, input buffering, emit resolution
//! - [`Emit`] / [`Recipient`]: what the logic asks to send, and to whom
//! - [`QueuePacket`] / [`Priority`]: what the worker actually sends
//! - [`RoomConfig`]: capacity

mod config;
mod error;
mod logic;
mod room;

pub use config::RoomConfig;
pub use error::{LogicFault, RoomError};
pub use logic::{Emit, Objects, Recipient, RoomLogic};
pub use room::{Priority, QueuePacket, Room};

pub use roomrelay_protocol::RoomStatus;
