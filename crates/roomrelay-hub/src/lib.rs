//! Hub process for roomrelay.
//!
//! The hub is the front door. Clients connect to it for a display name, the
//! server list and matchmaking; the hub picks the least-loaded worker,
//! reserves a slot there and redirects the client with a ticket. The hub
//! never simulates rooms.
//!
//! Workers are listed in the hub config. The hub dials each enabled one,
//! says `HubHello`, and from then on learns about the worker only through
//! its `WorkerRegister` and `WorkerStatus` heartbeats.
//!
//! # Key types
//!
//! - [`Hub`] / [`HubHandle`]: start a hub and control it
//! - [`Lobby`]: worker registry and matchmaking, usable without sockets
//! - [`Core`]: the synchronous tick logic
//! - [`HubConfig`]: static settings loaded at startup

use std::fmt;

use serde::{Deserialize, Serialize};

mod config;
mod core;
mod error;
mod hub;
mod links;
mod lobby;
pub mod names;

pub use crate::core::{Core, HubClientInfo, HubSnapshot, WorkerLinkView};
pub use config::{HubConfig, WorkerEntryConfig};
pub use error::{HubError, LobbyError};
pub use hub::{Hub, HubCommand, HubHandle};
pub use links::LinkEvent;
pub use lobby::{Availability, Lobby, RoomAssignment, WorkerCapacity, WorkerView};

/// Id of a worker, as written in the hub config and sent in
/// `WorkerRegister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}
