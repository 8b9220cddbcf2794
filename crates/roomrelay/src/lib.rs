//! # roomrelay
//!
//! A hub/worker relay for real-time browser games.
//!
//! Clients talk to the **hub** first: they get a display name and the server
//! list, and ask to join. The hub picks the least-loaded **worker**, reserves
//! a slot there and redirects the client. Workers host rooms and run their
//! simulation on a fixed tick, relaying each room's output to its members
//! over WebSocket.
//!
//! This crate ties the layers together for the `relay-hub` and
//! `relay-worker` binaries: config files, logging, the admin console and a
//! unified [`RelayError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomrelay::prelude::*;
//!
//! # async fn run() -> Result<(), RelayError> {
//! let worker = Worker::start(WorkerConfig::default(), |_| SnakeGame::new()).await?;
//! let hub = Hub::start(HubConfig::default()).await?;
//! # hub.shutdown().await;
//! # worker.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod console;
mod error;
pub mod logging;

pub use error::RelayError;

pub mod prelude {
    pub use crate::RelayError;
    pub use roomrelay_games::{BounceGame, GameKind, SnakeGame};
    pub use roomrelay_hub::{Hub, HubConfig, HubHandle, WorkerEntryConfig, WorkerId};
    pub use roomrelay_protocol::{BinaryCodec, Codec, JoinStatus, Packet, RoomId};
    pub use roomrelay_room::{Emit, LogicFault, Objects, RoomLogic};
    pub use roomrelay_worker::{Worker, WorkerCommand, WorkerConfig, WorkerHandle};
}
