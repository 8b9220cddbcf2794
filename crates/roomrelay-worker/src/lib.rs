//! Worker process for roomrelay.
//!
//! A worker hosts rooms and runs their simulation on one fixed-interval
//! tick loop. Clients reach it directly after the hub has reserved a slot
//! for them; the hub itself connects as an ordinary WebSocket client and
//! identifies itself with `HubHello`.
//!
//! # Key types
//!
//! - [`Worker`] / [`WorkerHandle`]: start a worker and control it
//! - [`Core`]: the synchronous tick logic, usable without sockets
//! - [`WorkerConfig`]: static settings loaded at startup

mod config;
mod core;
mod error;
mod reservations;
mod worker;

pub use crate::core::{ClientInfo, Core, RoomFactory, WorkerSnapshot, WorkerState};
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use worker::{Worker, WorkerCommand, WorkerHandle};
