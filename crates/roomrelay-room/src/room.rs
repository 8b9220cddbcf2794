//! The room itself: slots, buffered inputs, emit resolution.

use std::time::Duration;

use roomrelay_protocol::{DisconnectCode, Packet, RoomId, RoomLoad, RoomStatus};
use roomrelay_transport::ClientId;

use crate::{Emit, LogicFault, Objects, Recipient, RoomConfig, RoomError, RoomLogic};

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Delivery priority. `High` is flushed before `Normal` within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
}

/// One packet resolved to concrete destinations, ready to encode and send.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePacket {
    pub destinations: Vec<ClientId>,
    pub packet: Packet,
    pub priority: Priority,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

pub struct Room<L: RoomLogic> {
    id: RoomId,
    config: RoomConfig,
    logic: L,
    /// Index is the slot number handed to `RoomLogic::spawn`.
    slots: Vec<Option<ClientId>>,
    objects: Objects<L::Object>,
    inputs: Vec<(ClientId, Packet)>,
    /// Emits produced between ticks (joins, leaves), sent with the next tick.
    pending: Vec<Emit>,
    tick: u64,
    status: RoomStatus,
}

impl<L: RoomLogic> Room<L> {
    pub fn new(id: RoomId, config: RoomConfig, logic: L) -> Self {
        let config = config.validated();
        tracing::debug!(room_id = %id, capacity = config.capacity, "room created");
        Self {
            id,
            slots: vec![None; config.capacity],
            config,
            logic,
            objects: Objects::new(),
            inputs: Vec::new(),
            pending: Vec::new(),
            tick: 0,
            status: RoomStatus::Open,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn logic(&self) -> &L {
        &self.logic
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, client: ClientId) -> bool {
        self.objects.contains_key(&client)
    }

    /// Current members in slot order.
    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn objects(&self) -> &Objects<L::Object> {
        &self.objects
    }

    /// Load summary reported to the hub.
    pub fn load(&self) -> RoomLoad {
        RoomLoad {
            room_id: self.id,
            players: self.len() as u32,
            capacity: self.config.capacity as u32,
            status: self.status,
        }
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds `client` in the lowest free slot and spawns its object.
    pub fn join(&mut self, client: ClientId) -> Result<(), RoomError> {
        if self.status.is_closing() {
            return Err(RoomError::RoomClosing(self.id));
        }
        if self.contains(client) {
            return Err(RoomError::AlreadyInRoom(client, self.id));
        }
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return Err(RoomError::RoomFull(self.id));
        };

        self.slots[slot] = Some(client);
        let object = self.logic.spawn(client, slot);
        self.objects.insert(client, object);
        let emits = self.logic.on_join(&self.objects, client);
        self.pending.extend(emits);
        self.refresh_status();

        tracing::info!(
            room_id = %self.id,
            %client,
            slot,
            players = self.len(),
            "client joined room"
        );
        Ok(())
    }

    /// Removes `client` and its object. Buffered inputs from it are dropped.
    pub fn leave(&mut self, client: ClientId) -> Result<(), RoomError> {
        if self.objects.remove(&client).is_none() {
            return Err(RoomError::NotInRoom(client, self.id));
        }
        for slot in self.slots.iter_mut().filter(|s| **s == Some(client)) {
            *slot = None;
        }
        self.inputs.retain(|(from, _)| *from != client);
        self.pending.retain(|emit| emit.recipient != Recipient::Client(client));

        if !self.status.is_closing() {
            let emits = self.logic.on_leave(&self.objects, client);
            self.pending.extend(emits);
            self.refresh_status();
        }

        tracing::info!(room_id = %self.id, %client, players = self.len(), "client left room");
        Ok(())
    }

    /// Buffers an input packet for the next tick.
    pub fn apply_input(&mut self, client: ClientId, packet: Packet) -> Result<(), RoomError> {
        if !self.contains(client) {
            return Err(RoomError::NotInRoom(client, self.id));
        }
        if self.status.is_closing() {
            return Err(RoomError::RoomClosing(self.id));
        }
        self.inputs.push((client, packet));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Runs one tick: buffered inputs in arrival order, then the simulation
    /// step. Returns every packet to send, `High` priority first.
    ///
    /// A closing or closed room does nothing and returns an empty queue.
    pub fn tick(&mut self, dt: Duration) -> Result<Vec<QueuePacket>, RoomError> {
        if self.status.is_closing() {
            return Ok(Vec::new());
        }
        self.tick += 1;

        let id = self.id;
        let fault = |source: LogicFault| RoomError::Fault { room: id, source };

        let mut emits = std::mem::take(&mut self.pending);
        for (client, packet) in std::mem::take(&mut self.inputs) {
            let out = self
                .logic
                .apply_input(&mut self.objects, client, packet)
                .map_err(fault)?;
            emits.extend(out);
        }
        emits.extend(
            self.logic
                .step(&mut self.objects, self.tick, dt)
                .map_err(fault)?,
        );

        let mut queue: Vec<QueuePacket> =
            emits.into_iter().filter_map(|emit| self.resolve(emit)).collect();
        queue.sort_by_key(|p| p.priority);
        Ok(queue)
    }

    /// Turns an emit into concrete destinations among current members.
    /// Returns `None` when nobody is left to receive it.
    fn resolve(&self, emit: Emit) -> Option<QueuePacket> {
        let destinations: Vec<ClientId> = self
            .members()
            .filter(|c| match emit.recipient {
                Recipient::All => true,
                Recipient::Client(id) => *c == id,
                Recipient::AllExcept(id) => *c != id,
            })
            .filter(|c| emit.echo || emit.origin != Some(*c))
            .collect();

        if destinations.is_empty() {
            return None;
        }
        Some(QueuePacket {
            destinations,
            packet: emit.packet,
            priority: emit.priority,
        })
    }

    // -----------------------------------------------------------------------
    // Closing
    // -----------------------------------------------------------------------

    /// Starts closing the room.
    ///
    /// Returns a high-priority `Disconnect` for every member and the members
    /// the caller must release. Members stay listed until they `leave` or
    /// [`finish_close`](Room::finish_close) runs. Calling it twice returns
    /// nothing the second time.
    pub fn close(
        &mut self,
        reason: DisconnectCode,
        message: impl Into<String>,
    ) -> (Vec<QueuePacket>, Vec<ClientId>) {
        if self.status.is_closing() {
            return (Vec::new(), Vec::new());
        }
        self.status = RoomStatus::Closing;
        self.inputs.clear();
        self.pending.clear();

        let members: Vec<ClientId> = self.members().collect();
        tracing::info!(room_id = %self.id, ?reason, members = members.len(), "room closing");
        if members.is_empty() {
            return (Vec::new(), members);
        }
        let queue = vec![QueuePacket {
            destinations: members.clone(),
            packet: Packet::Disconnect {
                reason,
                message: message.into(),
            },
            priority: Priority::High,
        }];
        (queue, members)
    }

    /// Drops every remaining member and marks the room closed for good.
    pub fn finish_close(&mut self) {
        self.status = RoomStatus::Closed;
        self.slots.iter_mut().for_each(|s| *s = None);
        self.objects.clear();
        tracing::debug!(room_id = %self.id, "room closed");
    }

    fn refresh_status(&mut self) {
        self.status = if self.len() >= self.config.capacity {
            RoomStatus::Full
        } else {
            RoomStatus::Open
        };
    }
}
