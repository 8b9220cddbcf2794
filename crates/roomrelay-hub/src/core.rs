//! The hub core: client requests, worker links and the lobby.
//!
//! Like the worker, the hub core is synchronous and single-owner; the
//! async shell batches transport events and hands them over once per lobby
//! tick. Each tick runs in this order:
//!
//! 1. **Links**: registration, heartbeats, draining and stopped notices,
//!    link loss.
//! 2. **Expiry**: unredeemed reservations and silent workers.
//! 3. **Clients**: names, server time, server list, join requests.
//! 4. **Flush**: replies go out in arrival order.
//!
//! A join is answered with a redirect. The hub sends `RoomReservation` to
//! the chosen worker straight away and queues the `JoinRoomResponse` for
//! the flush, so the reservation is on the wire before the client learns
//! where to go.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use roomrelay_protocol::{BinaryCodec, Codec, JoinStatus, Packet, RoomId, unix_millis};
use roomrelay_transport::{ClientEvent, ClientHandle, ClientId, DisconnectReason};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::lobby::{Availability, Lobby, RoomAssignment, WorkerCapacity, WorkerView};
use crate::{HubConfig, LinkEvent, LobbyError, WorkerId, names};

/// One connected client as seen by the admin console.
#[derive(Debug, Clone)]
pub struct HubClientInfo {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub name: Option<String>,
    pub rtt: Option<Duration>,
}

/// Point-in-time view of the hub.
#[derive(Debug, Clone)]
pub struct HubSnapshot {
    pub tick: u64,
    /// Sorted by client id.
    pub clients: Vec<HubClientInfo>,
    pub workers: Vec<WorkerLinkView>,
}

/// A worker's lobby record plus whether its link is currently up.
#[derive(Debug, Clone)]
pub struct WorkerLinkView {
    pub worker: WorkerView,
    pub linked: bool,
}

pub struct Core {
    config: HubConfig,
    codec: BinaryCodec,
    lobby: Lobby,
    clients: HashMap<ClientId, ClientHandle>,
    names: HashMap<ClientId, String>,
    links: HashMap<WorkerId, ClientHandle>,
    outbox: Vec<(ClientId, Packet)>,
    tick: u64,
}

impl Core {
    pub fn new(config: HubConfig) -> Self {
        let config = config.validated();
        let lobby = Lobby::new(&config.workers, config.reservation_ttl());
        Self {
            config,
            codec: BinaryCodec,
            lobby,
            clients: HashMap::new(),
            names: HashMap::new(),
            links: HashMap::new(),
            outbox: Vec::new(),
            tick: 0,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn is_linked(&self, worker: WorkerId) -> bool {
        self.links.contains_key(&worker)
    }

    pub fn snapshot(&self, now: Instant) -> HubSnapshot {
        let mut clients: Vec<HubClientInfo> = self
            .clients
            .values()
            .map(|handle| HubClientInfo {
                id: handle.id(),
                addr: handle.addr(),
                name: self.names.get(&handle.id()).cloned(),
                rtt: handle.rtt(),
            })
            .collect();
        clients.sort_by_key(|c| c.id);

        let workers = self
            .lobby
            .workers(now)
            .into_iter()
            .map(|worker| WorkerLinkView {
                linked: self.is_linked(worker.id),
                worker,
            })
            .collect();

        HubSnapshot {
            tick: self.tick,
            clients,
            workers,
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    pub fn tick(
        &mut self,
        links: impl IntoIterator<Item = LinkEvent>,
        events: impl IntoIterator<Item = ClientEvent>,
        now: Instant,
    ) {
        self.tick += 1;

        for (worker, event) in links {
            self.handle_link_event(worker, event, now);
        }

        for worker in self.lobby.expire(now, self.config.heartbeat_timeout()) {
            // A silent link is redialed from scratch.
            if let Some(link) = self.links.get(&worker) {
                link.disconnect(DisconnectReason::Kicked("heartbeat timeout".into()));
            }
        }

        for event in events {
            self.handle_event(event, now);
        }

        self.flush();
    }

    /// Closes every client and worker link. Used on shutdown.
    pub fn disconnect_all(&mut self) {
        for handle in self.clients.values().chain(self.links.values()) {
            handle.disconnect(DisconnectReason::Shutdown);
        }
    }

    // -----------------------------------------------------------------------
    // Worker links
    // -----------------------------------------------------------------------

    fn handle_link_event(&mut self, worker: WorkerId, event: ClientEvent, now: Instant) {
        match event {
            ClientEvent::Connected(handle) => {
                debug!(%worker, link = %handle.id(), "worker link connected");
                self.links.insert(worker, handle);
            }
            ClientEvent::Data { client, data } => {
                let live = self.links.get(&worker).filter(|l| l.id() == client);
                if live.is_none_or(ClientHandle::is_closing) {
                    trace!(%worker, link = %client, "data from closing link dropped");
                    return;
                }
                match self.codec.decode(&data) {
                    Ok(packet) => self.handle_link_packet(worker, packet, now),
                    Err(err) => {
                        warn!(%worker, link = %client, error = %err, "undecodable packet from worker");
                        if let Some(link) = self.links.get(&worker) {
                            link.disconnect(DisconnectReason::ProtocolViolation(format!(
                                "decode error: {err}"
                            )));
                        }
                    }
                }
            }
            ClientEvent::Disconnected { client, reason } => {
                if self.links.get(&worker).is_some_and(|l| l.id() == client) {
                    self.links.remove(&worker);
                }
                let was_live = matches!(
                    self.lobby.availability(worker),
                    Some(Availability::Available | Availability::Draining)
                );
                if was_live {
                    let lost = self.lobby.mark_unavailable(worker);
                    warn!(%worker, %reason, rooms_lost = lost.len(), "worker link lost");
                } else {
                    debug!(%worker, %reason, "worker link closed");
                }
            }
        }
    }

    fn handle_link_packet(&mut self, worker: WorkerId, packet: Packet, now: Instant) {
        trace!(%worker, packet = packet.name(), "link packet received");
        match packet {
            Packet::WorkerRegister {
                worker_id,
                max_rooms,
                room_capacity,
                tick_interval_ms,
            } => {
                if WorkerId(worker_id) != worker {
                    warn!(%worker, reported = worker_id, "worker id mismatch, dropping link");
                    if let Some(link) = self.links.get(&worker) {
                        link.disconnect(DisconnectReason::Kicked("worker id mismatch".into()));
                    }
                    return;
                }
                let capacity = WorkerCapacity {
                    max_rooms,
                    room_capacity,
                    tick_interval_ms,
                };
                if let Err(err) = self.lobby.register(worker, capacity, now) {
                    warn!(%worker, error = %err, "registration refused");
                }
            }
            Packet::WorkerStatus { rooms, redeemed } => {
                if let Err(err) = self.lobby.heartbeat(worker, &rooms, &redeemed, now) {
                    debug!(%worker, error = %err, "heartbeat ignored");
                }
            }
            Packet::WorkerDraining => self.lobby.set_draining(worker),
            Packet::WorkerStopped => {
                let lost = self.lobby.deregister(worker);
                info!(%worker, rooms_closed = lost.len(), "worker stopped");
            }
            Packet::Disconnect { reason, message } => {
                debug!(%worker, ?reason, %message, "worker closing the link");
            }
            other => {
                debug!(%worker, packet = other.name(), "unexpected packet from worker ignored");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    fn handle_event(&mut self, event: ClientEvent, now: Instant) {
        match event {
            ClientEvent::Connected(handle) => {
                debug!(client = %handle.id(), addr = %handle.addr(), "client connected");
                self.clients.insert(handle.id(), handle);
            }
            ClientEvent::Data { client, data } => self.handle_data(client, &data, now),
            ClientEvent::Disconnected { client, reason } => {
                debug!(%client, %reason, "client disconnected");
                self.clients.remove(&client);
                self.names.remove(&client);
            }
        }
    }

    fn handle_data(&mut self, client: ClientId, data: &[u8], now: Instant) {
        // A connection already told to close gets nothing more processed,
        // including the rest of the batch it sent with a bad frame.
        if self.clients.get(&client).is_none_or(ClientHandle::is_closing) {
            trace!(%client, "data from closing client dropped");
            return;
        }
        let packet = match self.codec.decode(data) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%client, error = %err, "undecodable packet, closing connection");
                if let Some(handle) = self.clients.get(&client) {
                    handle.disconnect(DisconnectReason::ProtocolViolation(format!(
                        "decode error: {err}"
                    )));
                }
                return;
            }
        };
        trace!(%client, packet = packet.name(), "packet received");

        match packet {
            Packet::PlayerNameRequest => {
                let name = names::generate(&mut rand::rng());
                self.names.insert(client, name.clone());
                self.reply(client, Packet::PlayerNameResponse { name });
            }
            Packet::ServerTimeRequest { client_time } => self.reply(
                client,
                Packet::ServerTimeResponse {
                    client_time,
                    server_time: unix_millis(),
                },
            ),
            Packet::ServerListRequest => {
                let servers = self.lobby.server_list(now);
                let status = if servers.iter().any(|s| s.available) {
                    JoinStatus::Ok
                } else {
                    JoinStatus::NoCapacity
                };
                self.reply(client, Packet::ServerListResponse { status, servers });
            }
            Packet::JoinRoomRequest { room_id, .. } => {
                if !room_id.is_any() {
                    debug!(%client, %room_id, "specific room requested, matching anyway");
                }
                let response = match self.assign(client, now) {
                    Ok(a) => {
                        info!(%client, worker = %a.worker, room_id = %a.room, "client redirected");
                        Packet::JoinRoomResponse {
                            status: JoinStatus::Ok,
                            player_id: client.into_inner(),
                            room_id: a.room,
                            ticket: a.ticket,
                            address: a.address,
                            tick_interval_ms: a.tick_interval_ms,
                        }
                    }
                    Err(err) => {
                        debug!(%client, error = %err, "join refused");
                        Packet::JoinRoomResponse {
                            status: JoinStatus::NoCapacity,
                            player_id: client.into_inner(),
                            room_id: RoomId::ANY,
                            ticket: 0,
                            address: String::new(),
                            tick_interval_ms: 0,
                        }
                    }
                };
                self.reply(client, response);
            }
            other => {
                debug!(%client, packet = other.name(), "unexpected packet ignored");
            }
        }
    }

    /// Matches `client` to a worker and delivers the reservation to it.
    ///
    /// A worker whose link cannot take the reservation is marked
    /// unavailable and matching runs again without it.
    fn assign(&mut self, client: ClientId, now: Instant) -> Result<RoomAssignment, LobbyError> {
        loop {
            let assignment = self.lobby.handle_join_request(client, now)?;
            match self.reserve_on_worker(&assignment) {
                Ok(()) => return Ok(assignment),
                Err(err) => {
                    warn!(%client, error = %err, "reservation not delivered, retrying");
                    self.lobby.cancel(assignment.ticket);
                    self.lobby.mark_unavailable(assignment.worker);
                }
            }
        }
    }

    fn reserve_on_worker(&self, assignment: &RoomAssignment) -> Result<(), LobbyError> {
        let unavailable = || LobbyError::WorkerUnavailable(assignment.worker);
        let link = self
            .links
            .get(&assignment.worker)
            .filter(|link| !link.is_closing())
            .ok_or_else(unavailable)?;
        let reservation = Packet::RoomReservation {
            room_id: assignment.room,
            ticket: assignment.ticket,
        };
        let bytes = self.codec.encode(&reservation).map_err(|err| {
            warn!(error = %err, "reservation not encoded");
            unavailable()
        })?;
        link.send(bytes).map_err(|_| unavailable())
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn reply(&mut self, client: ClientId, packet: Packet) {
        self.outbox.push((client, packet));
    }

    fn flush(&mut self) {
        for (client, packet) in std::mem::take(&mut self.outbox) {
            let Some(handle) = self.clients.get(&client) else {
                trace!(%client, "destination gone before flush");
                continue;
            };
            let bytes = match self.codec.encode(&packet) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(%client, packet = packet.name(), error = %err, "packet dropped");
                    continue;
                }
            };
            if let Err(err) = handle.send(bytes) {
                debug!(%client, packet = packet.name(), error = %err, "send failed");
            }
        }
    }
}
