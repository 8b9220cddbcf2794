//! The `RoomLogic` trait: the extension point a game implements.
//!
//! The room owns membership and delivery. The logic owns the rules: what a
//! member's object looks like, how inputs change it, and what the world
//! does on every step. Every hook returns a list of [`Emit`]s that the room
//! resolves against its current members.

use std::collections::BTreeMap;
use std::time::Duration;

use roomrelay_protocol::Packet;
use roomrelay_transport::ClientId;

use crate::{LogicFault, Priority};

/// Per-member server objects, iterated in client id order.
pub type Objects<O> = BTreeMap<ClientId, O>;

// ---------------------------------------------------------------------------
// Emit
// ---------------------------------------------------------------------------

/// Who an [`Emit`] is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every current member.
    All,
    /// A single member. Dropped if the client is no longer in the room.
    Client(ClientId),
    /// Every current member but one.
    AllExcept(ClientId),
}

/// A packet the logic wants delivered.
///
/// `origin` names the client whose action caused the packet. Unless `echo`
/// is set, the room never delivers a packet back to its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Emit {
    pub recipient: Recipient,
    pub packet: Packet,
    pub origin: Option<ClientId>,
    pub echo: bool,
    pub priority: Priority,
}

impl Emit {
    pub fn new(recipient: Recipient, packet: Packet) -> Self {
        Self {
            recipient,
            packet,
            origin: None,
            echo: false,
            priority: Priority::Normal,
        }
    }

    /// Broadcast with no origin: every member receives it.
    pub fn to_all(packet: Packet) -> Self {
        Self::new(Recipient::All, packet)
    }

    pub fn to_client(client: ClientId, packet: Packet) -> Self {
        Self::new(Recipient::Client(client), packet)
    }

    /// Marks the packet as caused by `client`.
    pub fn caused_by(mut self, client: ClientId) -> Self {
        self.origin = Some(client);
        self
    }

    /// Delivers the packet to its origin too.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn urgent(mut self) -> Self {
        self.priority = Priority::High;
        self
    }
}

// ---------------------------------------------------------------------------
// RoomLogic
// ---------------------------------------------------------------------------

/// Game rules for one room.
///
/// Hooks run on the worker's tick thread and must not block. A hook that
/// returns `Err` faults the room; the worker then closes it with
/// `DisconnectCode::RoomFault` while sibling rooms keep running.
pub trait RoomLogic: Send + 'static {
    /// The server-side object each member owns.
    type Object: Send;

    /// Creates the object for a member that just took `slot`.
    fn spawn(&mut self, client: ClientId, slot: usize) -> Self::Object;

    /// Called after `client` joined and its object was inserted.
    /// Emits are delivered with the next tick.
    fn on_join(&mut self, _objects: &Objects<Self::Object>, _client: ClientId) -> Vec<Emit> {
        Vec::new()
    }

    /// Called after `client` left and its object was removed.
    fn on_leave(&mut self, _objects: &Objects<Self::Object>, _client: ClientId) -> Vec<Emit> {
        Vec::new()
    }

    /// Applies one buffered input packet from `client`.
    ///
    /// Runs at the start of a tick, in arrival order, before [`step`].
    ///
    /// [`step`]: RoomLogic::step
    fn apply_input(
        &mut self,
        objects: &mut Objects<Self::Object>,
        client: ClientId,
        packet: Packet,
    ) -> Result<Vec<Emit>, LogicFault>;

    /// Advances the simulation by `dt`. `tick` starts at 1.
    fn step(
        &mut self,
        objects: &mut Objects<Self::Object>,
        tick: u64,
        dt: Duration,
    ) -> Result<Vec<Emit>, LogicFault>;
}
