//! The worker core: rooms, clients and the four-phase tick.
//!
//! `Core` is synchronous and single-owner. The async shell in
//! [`worker`](crate::worker) collects transport events between ticks and
//! hands them over in one batch, so everything a tick does happens in
//! this order:
//!
//! 1. **Events**: register and release clients, decode frames, answer
//!    direct requests, buffer room inputs.
//! 2. **Simulate**: tick every open room once, each behind `catch_unwind`.
//! 3. **Collect**: room output lands in the queue.
//! 4. **Flush**: encode each queued packet once, push it to every
//!    destination, then release closed rooms and drop idle ones.
//!
//! Output of tick N is flushed before tick N+1 starts.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use roomrelay_protocol::{
    BinaryCodec, Codec, DisconnectCode, JoinStatus, Packet, RoomId, RoomLoad, unix_millis,
};
use roomrelay_room::{Priority, QueuePacket, Room, RoomLogic};
use roomrelay_transport::{ClientEvent, ClientHandle, ClientId, DisconnectReason, TransportError};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::WorkerConfig;
use crate::reservations::Reservations;

/// Builds the logic for a freshly created room.
pub type RoomFactory<L> = Arc<dyn Fn(RoomId) -> L + Send + Sync>;

// ---------------------------------------------------------------------------
// State and snapshots
// ---------------------------------------------------------------------------

/// Lifecycle of a worker.
///
/// ```text
/// Starting → Running → Draining → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    /// Refusing joins; the next tick closes every room.
    Draining,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// One connected client as seen by the admin console.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub room: Option<RoomId>,
    pub rtt: Option<Duration>,
    pub is_hub: bool,
}

/// Point-in-time view of a worker.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub worker_id: u32,
    pub state: WorkerState,
    pub tick: u64,
    pub tick_interval_ms: u32,
    pub rooms: Vec<RoomLoad>,
    /// Sorted by client id.
    pub clients: Vec<ClientInfo>,
    pub reservations: usize,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

pub struct Core<L: RoomLogic> {
    config: WorkerConfig,
    factory: RoomFactory<L>,
    codec: BinaryCodec,
    state: WorkerState,
    rooms: BTreeMap<RoomId, Room<L>>,
    clients: HashMap<ClientId, ClientHandle>,
    memberships: HashMap<ClientId, RoomId>,
    reservations: Reservations,
    queue: Vec<QueuePacket>,
    /// The connection that introduced itself with `HubHello`.
    hub: Option<ClientId>,
    /// Tickets consumed since the last `WorkerStatus`.
    redeemed: Vec<u64>,
    next_status: Option<Instant>,
    next_room_id: u64,
    tick: u64,
}

impl<L: RoomLogic> Core<L> {
    pub fn new(config: WorkerConfig, factory: RoomFactory<L>) -> Self {
        Self {
            config: config.validated(),
            factory,
            codec: BinaryCodec,
            state: WorkerState::Starting,
            rooms: BTreeMap::new(),
            clients: HashMap::new(),
            memberships: HashMap::new(),
            reservations: Reservations::default(),
            queue: Vec::new(),
            hub: None,
            redeemed: Vec::new(),
            next_status: None,
            next_room_id: 1,
            tick: 0,
        }
    }

    /// `Starting → Running`. Called once the listener is bound.
    pub fn start(&mut self) {
        if self.state == WorkerState::Starting {
            self.state = WorkerState::Running;
            info!(worker = self.config.worker_id, "worker running");
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn room(&self, id: RoomId) -> Option<&Room<L>> {
        self.rooms.get(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room<L>> {
        self.rooms.values()
    }

    pub fn room_of(&self, client: ClientId) -> Option<RoomId> {
        self.memberships.get(&client).copied()
    }

    pub fn is_hub_linked(&self) -> bool {
        self.hub.is_some()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let mut clients: Vec<ClientInfo> = self
            .clients
            .values()
            .map(|h| ClientInfo {
                id: h.id(),
                addr: h.addr(),
                room: self.room_of(h.id()),
                rtt: h.rtt(),
                is_hub: self.hub == Some(h.id()),
            })
            .collect();
        clients.sort_by_key(|c| c.id);

        WorkerSnapshot {
            worker_id: self.config.worker_id,
            state: self.state,
            tick: self.tick,
            tick_interval_ms: self.config.tick_interval_ms,
            rooms: self.rooms.values().map(Room::load).collect(),
            clients,
            reservations: self.reservations.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Runs one full tick over the events gathered since the last one.
    pub fn tick(&mut self, events: impl IntoIterator<Item = ClientEvent>, now: Instant, dt: Duration) {
        if self.state == WorkerState::Stopped {
            return;
        }
        self.tick += 1;

        let expired = self.reservations.expire(now);
        if expired > 0 {
            debug!(expired, "reservations expired");
        }

        // Phase 1: events.
        for event in events {
            self.handle_event(event, now);
        }

        // Phases 2 and 3: simulate and collect.
        for room in self.rooms.values_mut() {
            if room.status().is_closing() {
                continue;
            }
            let reason = match panic::catch_unwind(AssertUnwindSafe(|| room.tick(dt))) {
                Ok(Ok(out)) => {
                    self.queue.extend(out);
                    continue;
                }
                Ok(Err(err)) => {
                    warn!(room_id = %room.id(), error = %err, "room tick failed");
                    err.to_string()
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!(room_id = %room.id(), panic = %msg, "room tick panicked");
                    format!("room fault: {msg}")
                }
            };
            let (out, _) = room.close(DisconnectCode::RoomFault, reason);
            self.queue.extend(out);
        }

        let draining = self.state == WorkerState::Draining;
        if draining {
            for room in self.rooms.values_mut() {
                let (out, _) = room.close(DisconnectCode::ServerShutdown, "worker shutting down");
                self.queue.extend(out);
            }
            self.reservations.clear();
        }

        // Phase 4: flush.
        self.flush();
        self.release_closed_rooms();
        self.drop_idle_rooms();

        if draining {
            self.send_to_hub(&Packet::WorkerStopped);
            self.state = WorkerState::Stopped;
            info!(worker = self.config.worker_id, "worker stopped");
        } else {
            self.report_status(now);
        }
    }

    fn handle_event(&mut self, event: ClientEvent, now: Instant) {
        match event {
            ClientEvent::Connected(handle) => {
                debug!(client = %handle.id(), addr = %handle.addr(), "client connected");
                self.clients.insert(handle.id(), handle);
            }
            ClientEvent::Data { client, data } => self.handle_data(client, &data, now),
            ClientEvent::Disconnected { client, reason } => {
                debug!(%client, %reason, "client disconnected");
                self.release(client);
                self.clients.remove(&client);
                if self.hub == Some(client) {
                    self.hub = None;
                    // The next hub reconciles from a fresh status.
                    self.redeemed.clear();
                    warn!("hub link lost");
                }
            }
        }
    }

    fn handle_data(&mut self, client: ClientId, data: &[u8], now: Instant) {
        if self.clients.get(&client).is_none_or(ClientHandle::is_closing) {
            trace!(%client, "data from released or closing client dropped");
            return;
        }
        let packet = match self.codec.decode(data) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%client, error = %err, "undecodable packet, closing connection");
                self.kick(client, DisconnectReason::ProtocolViolation(format!("decode error: {err}")));
                return;
            }
        };
        trace!(%client, packet = packet.name(), "packet received");

        match packet {
            Packet::ServerTimeRequest { client_time } => self.reply(
                client,
                Packet::ServerTimeResponse {
                    client_time,
                    server_time: unix_millis(),
                },
            ),
            Packet::JoinRoomRequest { room_id, ticket } => {
                self.handle_join(client, room_id, ticket, now);
            }
            Packet::HubHello { hub_name } => self.handle_hub_hello(client, &hub_name),
            Packet::RoomReservation { room_id, ticket } => {
                self.handle_reservation(client, room_id, ticket, now);
            }
            input @ (Packet::PlayerInput { .. }
            | Packet::SetViewport { .. }
            | Packet::SetCount { .. }) => self.route_input(client, input),
            other => {
                debug!(%client, packet = other.name(), "unexpected packet ignored");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Joins
    // -----------------------------------------------------------------------

    fn handle_join(&mut self, client: ClientId, room_id: RoomId, ticket: u64, now: Instant) {
        let (status, room_id) = match self.try_join(client, room_id, ticket, now) {
            Ok(joined) => (JoinStatus::Ok, joined),
            Err(status) => {
                debug!(%client, %room_id, ?status, "join refused");
                (status, room_id)
            }
        };
        self.reply(
            client,
            Packet::JoinRoomResponse {
                status,
                player_id: client.into_inner(),
                room_id,
                ticket,
                address: String::new(),
                tick_interval_ms: self.config.tick_interval_ms,
            },
        );
    }

    fn try_join(
        &mut self,
        client: ClientId,
        room_id: RoomId,
        ticket: u64,
        now: Instant,
    ) -> Result<RoomId, JoinStatus> {
        if self.state != WorkerState::Running {
            return Err(JoinStatus::RoomClosing);
        }
        if self.memberships.contains_key(&client) {
            return Err(JoinStatus::AlreadyInRoom);
        }

        let reserved = self.reservations.redeem(room_id, ticket, now);
        let room_id = if reserved {
            room_id
        } else if self.config.standalone {
            self.standalone_target(room_id)?
        } else {
            return Err(JoinStatus::InvalidTicket);
        };

        self.room_or_create(room_id)?
            .join(client)
            .map_err(|e| e.join_status())?;
        self.memberships.insert(client, room_id);
        // Only a ticket that bought a seat counts as redeemed for the hub.
        if reserved {
            self.redeemed.push(ticket);
        }
        Ok(room_id)
    }

    /// Without a hub, `RoomId::ANY` means the lowest open room, or a new one
    /// while under `max_rooms`.
    fn standalone_target(&mut self, requested: RoomId) -> Result<RoomId, JoinStatus> {
        if !requested.is_any() {
            return Ok(requested);
        }
        if let Some(open) = self.rooms.values().find(|r| r.status().accepts_joins()) {
            return Ok(open.id());
        }
        if self.rooms.len() >= self.config.max_rooms as usize {
            return Err(JoinStatus::NoCapacity);
        }
        while self.rooms.contains_key(&RoomId(self.next_room_id)) {
            self.next_room_id += 1;
        }
        let id = RoomId(self.next_room_id);
        self.next_room_id += 1;
        Ok(id)
    }

    fn room_or_create(&mut self, id: RoomId) -> Result<&mut Room<L>, JoinStatus> {
        if !self.rooms.contains_key(&id) {
            if self.rooms.len() >= self.config.max_rooms as usize {
                return Err(JoinStatus::NoCapacity);
            }
            self.create_room(id);
        }
        self.rooms.get_mut(&id).ok_or(JoinStatus::RoomClosing)
    }

    fn create_room(&mut self, id: RoomId) {
        let logic = (self.factory)(id);
        self.rooms.insert(id, Room::new(id, self.config.room_config(), logic));
        info!(room_id = %id, rooms = self.rooms.len(), "room created");
    }

    fn route_input(&mut self, client: ClientId, packet: Packet) {
        let Some(room_id) = self.room_of(client) else {
            debug!(%client, packet = packet.name(), "input from client outside any room");
            return;
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            if let Err(err) = room.apply_input(client, packet) {
                debug!(%client, error = %err, "input dropped");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Hub link
    // -----------------------------------------------------------------------

    fn handle_hub_hello(&mut self, client: ClientId, hub_name: &str) {
        if let Some(previous) = self.hub.filter(|h| *h != client) {
            warn!(%previous, %client, "hub link replaced");
        }
        self.hub = Some(client);
        self.next_status = None;
        info!(%client, hub = hub_name, "hub linked");
        self.reply(
            client,
            Packet::WorkerRegister {
                worker_id: self.config.worker_id,
                max_rooms: self.config.max_rooms,
                room_capacity: self.config.room_capacity,
                tick_interval_ms: self.config.tick_interval_ms,
            },
        );
    }

    fn handle_reservation(&mut self, client: ClientId, room_id: RoomId, ticket: u64, now: Instant) {
        if self.hub != Some(client) {
            warn!(%client, "reservation from a connection that is not the hub");
            self.kick(
                client,
                DisconnectReason::ProtocolViolation("reservation from non-hub connection".into()),
            );
            return;
        }
        if self.state != WorkerState::Running {
            debug!(%room_id, "reservation refused while {}", self.state);
            return;
        }
        if room_id.is_any() {
            warn!(ticket, "reservation without a room id ignored");
            return;
        }
        if !self.rooms.contains_key(&room_id) {
            if self.rooms.len() >= self.config.max_rooms as usize {
                warn!(%room_id, "reservation for a new room while at max_rooms ignored");
                return;
            }
            self.create_room(room_id);
        }
        self.reservations
            .insert(room_id, ticket, now + self.config.reservation_ttl());
        debug!(%room_id, ticket, "reservation stored");
    }

    fn report_status(&mut self, now: Instant) {
        let Some(hub) = self.hub else {
            return;
        };
        if self.next_status.is_some_and(|at| now < at) {
            return;
        }
        self.next_status = Some(now + self.config.status_interval());
        let status = Packet::WorkerStatus {
            rooms: self.rooms.values().map(Room::load).collect(),
            redeemed: std::mem::take(&mut self.redeemed),
        };
        self.send_now(hub, &status);
    }

    // -----------------------------------------------------------------------
    // Admin commands
    // -----------------------------------------------------------------------

    /// Enters `Draining` and tells the hub. The next tick finishes the job.
    pub fn begin_drain(&mut self) {
        if !matches!(self.state, WorkerState::Starting | WorkerState::Running) {
            return;
        }
        self.state = WorkerState::Draining;
        info!(worker = self.config.worker_id, rooms = self.rooms.len(), "worker draining");
        self.send_to_hub(&Packet::WorkerDraining);
    }

    /// Changes the tick interval and announces it to every room member.
    /// The caller reschedules its clock.
    pub fn set_tick_interval(&mut self, tick_interval_ms: u32) {
        let tick_interval_ms = tick_interval_ms.max(1);
        self.config.tick_interval_ms = tick_interval_ms;
        info!(tick_interval_ms, "tick interval changed");

        let mut destinations: Vec<ClientId> = self.memberships.keys().copied().collect();
        if destinations.is_empty() {
            return;
        }
        destinations.sort();
        self.queue.push(QueuePacket {
            destinations,
            packet: Packet::SetTickInterval { tick_interval_ms },
            priority: Priority::High,
        });
    }

    /// Closes every remaining connection. Used once the loop has exited.
    pub fn disconnect_all(&mut self) {
        for handle in self.clients.values() {
            handle.disconnect(DisconnectReason::Shutdown);
        }
        self.memberships.clear();
    }

    // -----------------------------------------------------------------------
    // Output and release
    // -----------------------------------------------------------------------

    fn reply(&mut self, client: ClientId, packet: Packet) {
        self.queue.push(QueuePacket {
            destinations: vec![client],
            packet,
            priority: Priority::High,
        });
    }

    /// Sends outside the queue, for hub traffic produced after the flush.
    fn send_now(&self, client: ClientId, packet: &Packet) {
        let Some(handle) = self.clients.get(&client) else {
            return;
        };
        let bytes = match self.codec.encode(packet) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(packet = packet.name(), error = %err, "packet dropped");
                return;
            }
        };
        if let Err(err) = handle.send(bytes) {
            warn!(%client, packet = packet.name(), error = %err, "send failed");
        }
    }

    fn send_to_hub(&self, packet: &Packet) {
        if let Some(hub) = self.hub {
            self.send_now(hub, packet);
        }
    }

    fn flush(&mut self) {
        // Queue order is delivery order: direct replies, then each room's
        // output (already priority-sorted by the room), then closings.
        let mut overflowed = Vec::new();
        for item in std::mem::take(&mut self.queue) {
            let bytes = match self.codec.encode(&item.packet) {
                Ok(bytes) => bytes,
                Err(err) => {
                    error!(packet = item.packet.name(), error = %err, "packet dropped");
                    continue;
                }
            };
            for dest in &item.destinations {
                let Some(handle) = self.clients.get(dest) else {
                    trace!(client = %dest, "destination gone before flush");
                    continue;
                };
                match handle.send(bytes.clone()) {
                    Ok(()) => {}
                    Err(err @ TransportError::Backpressure(_)) => {
                        debug!(client = %dest, error = %err, "slow client released");
                        overflowed.push(*dest);
                    }
                    Err(err) => {
                        debug!(client = %dest, packet = item.packet.name(), error = %err, "send failed");
                    }
                }
            }
        }
        // The handle already asked its IO task to close; the slot is freed
        // now rather than when the socket finally goes away.
        for client in overflowed {
            self.release(client);
        }
    }

    /// Frees the room slot held by `client`, if any.
    fn release(&mut self, client: ClientId) {
        let Some(room_id) = self.memberships.remove(&client) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            if let Err(err) = room.leave(client) {
                debug!(%client, error = %err, "release found no slot");
            }
        }
    }

    fn kick(&mut self, client: ClientId, reason: DisconnectReason) {
        self.release(client);
        if let Some(handle) = self.clients.get(&client) {
            handle.disconnect(reason);
        }
    }

    /// Removes rooms that started closing this tick and closes their
    /// members' connections. Their `Disconnect` packets were flushed first.
    fn release_closed_rooms(&mut self) {
        let closing: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|r| r.status().is_closing())
            .map(Room::id)
            .collect();

        for id in closing {
            let Some(mut room) = self.rooms.remove(&id) else {
                continue;
            };
            let reason = if self.state == WorkerState::Draining {
                DisconnectReason::Shutdown
            } else {
                DisconnectReason::Kicked(format!("{id} closed"))
            };
            for client in room.members() {
                self.memberships.remove(&client);
                if let Some(handle) = self.clients.get(&client) {
                    handle.disconnect(reason.clone());
                }
            }
            room.finish_close();
            info!(room_id = %id, "room released");
        }
    }

    fn drop_idle_rooms(&mut self) {
        let reservations = &self.reservations;
        self.rooms.retain(|id, room| {
            let keep = !room.is_empty() || reservations.holds(*id);
            if !keep {
                debug!(room_id = %id, "empty room dropped");
            }
            keep
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
