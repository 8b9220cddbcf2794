//! Worker registry and matchmaking.
//!
//! The lobby is the hub's only source of truth about where players can go.
//! It knows which configured workers are registered, what each one last
//! reported about its rooms, and which assignments it has handed out that
//! the worker has not confirmed yet. Occupancy is always
//! `reported players + pending reservations`, so a burst of joins between
//! two heartbeats cannot overfill a room.
//!
//! Everything here is synchronous and clock-injected; the hub core owns the
//! lobby and calls into it from its tick.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use roomrelay_protocol::{RoomId, RoomLoad, RoomStatus, ServerListEntry};
use roomrelay_transport::ClientId;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{LobbyError, WorkerEntryConfig, WorkerId};

// ---------------------------------------------------------------------------
// Public views
// ---------------------------------------------------------------------------

/// Registry state of one configured worker.
///
/// ```text
/// Unregistered → Available ⇄ Draining
///       ↑            ↓          ↓
///       └──────  Unavailable ←──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Never registered, or stopped cleanly.
    Unregistered,
    Available,
    /// Finishing its rooms; takes no new players.
    Draining,
    /// Link lost or heartbeat missed.
    Unavailable,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unregistered => "unregistered",
            Self::Available => "available",
            Self::Draining => "draining",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// What a worker announced in `WorkerRegister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerCapacity {
    pub max_rooms: u32,
    pub room_capacity: u32,
    pub tick_interval_ms: u32,
}

impl WorkerCapacity {
    fn total_slots(&self) -> u64 {
        u64::from(self.max_rooms) * u64::from(self.room_capacity)
    }
}

/// Where a client should go, handed back by [`Lobby::handle_join_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAssignment {
    pub worker: WorkerId,
    /// WebSocket URL of the worker.
    pub address: String,
    pub room: RoomId,
    pub ticket: u64,
    pub tick_interval_ms: u32,
}

/// One worker as the admin console sees it.
#[derive(Debug, Clone)]
pub struct WorkerView {
    pub id: WorkerId,
    pub name: String,
    pub address: String,
    pub enabled: bool,
    pub availability: Availability,
    pub rooms: u32,
    pub max_rooms: u32,
    pub players: u32,
    pub pending: u32,
}

// ---------------------------------------------------------------------------
// Internal records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct ReportedRoom {
    players: u32,
    capacity: u32,
    status: RoomStatus,
}

#[derive(Debug)]
struct WorkerRecord {
    config: WorkerEntryConfig,
    availability: Availability,
    capacity: Option<WorkerCapacity>,
    rooms: BTreeMap<RoomId, ReportedRoom>,
    last_seen: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct PendingReservation {
    worker: WorkerId,
    room: RoomId,
    client: ClientId,
    expires_at: Instant,
}

/// Occupancy of one room as the lobby counts it.
#[derive(Debug, Clone, Copy)]
struct RoomCount {
    id: RoomId,
    occupied: u32,
    capacity: u32,
    open: bool,
}

impl RoomCount {
    fn has_slot(&self) -> bool {
        self.open && self.occupied < self.capacity
    }
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

pub struct Lobby {
    workers: BTreeMap<WorkerId, WorkerRecord>,
    /// Keyed by ticket.
    reservations: HashMap<u64, PendingReservation>,
    /// Every active room belongs to exactly one worker.
    owners: HashMap<RoomId, WorkerId>,
    reservation_ttl: Duration,
    next_room_id: u64,
}

impl Lobby {
    pub fn new(workers: &[WorkerEntryConfig], reservation_ttl: Duration) -> Self {
        let workers = workers
            .iter()
            .map(|config| {
                let record = WorkerRecord {
                    config: config.clone(),
                    availability: Availability::Unregistered,
                    capacity: None,
                    rooms: BTreeMap::new(),
                    last_seen: None,
                };
                (config.id, record)
            })
            .collect();
        Self {
            workers,
            reservations: HashMap::new(),
            owners: HashMap::new(),
            reservation_ttl,
            next_room_id: 1,
        }
    }

    pub fn availability(&self, worker: WorkerId) -> Option<Availability> {
        self.workers.get(&worker).map(|w| w.availability)
    }

    /// The worker hosting `room`, if the lobby knows of it.
    pub fn owner_of(&self, room: RoomId) -> Option<WorkerId> {
        self.owners.get(&room).copied()
    }

    pub fn pending_reservations(&self) -> usize {
        self.reservations.len()
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Accepts a `WorkerRegister`. A re-register starts from a clean slate;
    /// the worker's next heartbeat repopulates its rooms.
    ///
    /// # Errors
    /// [`LobbyError::UnknownWorker`] for ids missing from the config or
    /// disabled there.
    pub fn register(
        &mut self,
        worker: WorkerId,
        capacity: WorkerCapacity,
        now: Instant,
    ) -> Result<(), LobbyError> {
        let record = self
            .workers
            .get_mut(&worker)
            .filter(|w| w.config.enabled)
            .ok_or(LobbyError::UnknownWorker(worker))?;
        let lost: Vec<RoomId> = record.rooms.keys().copied().collect();
        record.availability = Availability::Available;
        record.capacity = Some(capacity);
        record.rooms.clear();
        record.last_seen = Some(now);
        info!(
            %worker,
            max_rooms = capacity.max_rooms,
            room_capacity = capacity.room_capacity,
            "worker registered"
        );
        self.forget_rooms(worker, &lost);
        Ok(())
    }

    /// Reconciles a `WorkerStatus` heartbeat.
    ///
    /// The reported rooms replace what the lobby knew. Redeemed tickets stop
    /// counting as pending, because the player now shows up in the report.
    ///
    /// # Errors
    /// [`LobbyError::UnknownWorker`] if the worker never registered.
    pub fn heartbeat(
        &mut self,
        worker: WorkerId,
        rooms: &[RoomLoad],
        redeemed: &[u64],
        now: Instant,
    ) -> Result<(), LobbyError> {
        for ticket in redeemed {
            if let Some(r) = self.reservations.remove(ticket) {
                debug!(%worker, room_id = %r.room, client = %r.client, "reservation redeemed");
            }
        }

        let record = self
            .workers
            .get_mut(&worker)
            .filter(|w| w.capacity.is_some())
            .ok_or(LobbyError::UnknownWorker(worker))?;
        record.last_seen = Some(now);
        if record.availability == Availability::Unavailable {
            info!(%worker, "worker is back");
            record.availability = Availability::Available;
        }

        let previous: Vec<RoomId> = record.rooms.keys().copied().collect();
        record.rooms.clear();
        for load in rooms {
            match self.owners.get(&load.room_id) {
                Some(owner) if *owner != worker => {
                    warn!(%worker, %owner, room_id = %load.room_id, "room reported by two workers, ignored");
                    continue;
                }
                _ => {}
            }
            self.owners.insert(load.room_id, worker);
            record.rooms.insert(
                load.room_id,
                ReportedRoom {
                    players: load.players,
                    capacity: load.capacity,
                    status: load.status,
                },
            );
        }

        let gone: Vec<RoomId> = previous
            .into_iter()
            .filter(|id| !record.rooms.contains_key(id))
            .collect();
        self.forget_rooms(worker, &gone);
        Ok(())
    }

    /// The worker refuses new players from now on.
    pub fn set_draining(&mut self, worker: WorkerId) {
        if let Some(record) = self.workers.get_mut(&worker) {
            if record.availability == Availability::Available {
                info!(%worker, "worker draining");
                record.availability = Availability::Draining;
            }
        }
    }

    /// The worker stopped cleanly. Returns the rooms that went with it.
    pub fn deregister(&mut self, worker: WorkerId) -> Vec<RoomId> {
        self.drop_worker(worker, Availability::Unregistered)
    }

    /// The worker's link is gone. Returns the rooms that went with it.
    pub fn mark_unavailable(&mut self, worker: WorkerId) -> Vec<RoomId> {
        self.drop_worker(worker, Availability::Unavailable)
    }

    /// Expires stale reservations and marks workers that have not sent a
    /// heartbeat within `heartbeat_timeout` as unavailable.
    ///
    /// Returns the workers that just became unavailable.
    pub fn expire(&mut self, now: Instant, heartbeat_timeout: Duration) -> Vec<WorkerId> {
        let mut stale = Vec::new();
        self.reservations.retain(|_, r| {
            let live = r.expires_at > now;
            if !live {
                stale.push((r.worker, r.room));
            }
            live
        });
        if !stale.is_empty() {
            debug!(expired = stale.len(), "reservations expired unredeemed");
        }
        for (worker, room) in stale {
            let reported = self
                .workers
                .get(&worker)
                .is_some_and(|w| w.rooms.contains_key(&room));
            if !reported {
                self.forget_rooms(worker, &[room]);
            }
        }

        let silent: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, w)| {
                matches!(w.availability, Availability::Available | Availability::Draining)
                    && w.last_seen.is_some_and(|seen| now >= seen + heartbeat_timeout)
            })
            .map(|(id, _)| *id)
            .collect();

        for worker in &silent {
            warn!(%worker, "heartbeat missed, worker unavailable");
            let lost = self.mark_unavailable(*worker);
            if !lost.is_empty() {
                warn!(%worker, rooms = lost.len(), "rooms lost");
            }
        }
        silent
    }

    fn drop_worker(&mut self, worker: WorkerId, availability: Availability) -> Vec<RoomId> {
        let Some(record) = self.workers.get_mut(&worker) else {
            return Vec::new();
        };
        record.availability = availability;
        let mut lost: Vec<RoomId> = record.rooms.keys().copied().collect();
        record.rooms.clear();

        self.reservations.retain(|_, r| {
            if r.worker == worker {
                lost.push(r.room);
                false
            } else {
                true
            }
        });
        lost.sort_unstable();
        lost.dedup();
        self.forget_rooms(worker, &lost);
        lost
    }

    /// Drops ownership of `rooms` unless a pending reservation still points
    /// at them.
    fn forget_rooms(&mut self, worker: WorkerId, rooms: &[RoomId]) {
        for room in rooms {
            let pending = self.reservations.values().any(|r| r.room == *room);
            if !pending && self.owners.get(room) == Some(&worker) {
                self.owners.remove(room);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Matchmaking
    // -----------------------------------------------------------------------

    /// Picks a worker and room for `client` and records a pending
    /// reservation for it.
    ///
    /// The least-loaded available worker wins (ties go to the lowest id).
    /// Inside it, the lowest-id room with a free slot is filled first;
    /// otherwise a fresh room id is allocated.
    ///
    /// # Errors
    /// [`LobbyError::NoCapacity`] when no available worker has a free slot
    /// or room for another room.
    pub fn handle_join_request(
        &mut self,
        client: ClientId,
        now: Instant,
    ) -> Result<RoomAssignment, LobbyError> {
        let (worker, room) = self.pick(now).ok_or(LobbyError::NoCapacity)?;
        let room = match room {
            Some(room) => room,
            None => self.allocate_room_id(),
        };
        let ticket = self.fresh_ticket();
        self.reservations.insert(
            ticket,
            PendingReservation {
                worker,
                room,
                client,
                expires_at: now + self.reservation_ttl,
            },
        );
        self.owners.insert(room, worker);

        let record = &self.workers[&worker];
        let tick_interval_ms = record.capacity.map_or(0, |c| c.tick_interval_ms);
        debug!(%client, %worker, room_id = %room, "join assigned");
        Ok(RoomAssignment {
            worker,
            address: record.config.url(),
            room,
            ticket,
            tick_interval_ms,
        })
    }

    /// Cancels an assignment whose reservation never reached the worker.
    pub fn cancel(&mut self, ticket: u64) {
        if let Some(r) = self.reservations.remove(&ticket) {
            self.forget_rooms(r.worker, &[r.room]);
        }
    }

    /// The winning worker and, if one has a free slot, its room.
    fn pick(&self, now: Instant) -> Option<(WorkerId, Option<RoomId>)> {
        self.workers
            .iter()
            .filter(|(_, w)| w.availability == Availability::Available)
            .filter_map(|(id, w)| {
                let capacity = w.capacity?;
                let rooms = self.room_counts(*id, w, capacity, now);
                let occupied: u64 = rooms.iter().map(|r| u64::from(r.occupied)).sum();
                let target = match rooms.iter().find(|r| r.has_slot()) {
                    Some(room) => Some(room.id),
                    None if rooms.len() < capacity.max_rooms as usize => None,
                    None => return None,
                };
                Some((*id, occupied, capacity.total_slots(), target))
            })
            // occupied_a / total_a < occupied_b / total_b, without floats.
            .min_by(|a, b| {
                (a.1 * b.2)
                    .cmp(&(b.1 * a.2))
                    .then_with(|| a.0.cmp(&b.0))
            })
            .map(|(id, _, _, target)| (id, target))
    }

    /// Reported rooms plus rooms that exist only as pending reservations,
    /// in id order.
    fn room_counts(
        &self,
        worker: WorkerId,
        record: &WorkerRecord,
        capacity: WorkerCapacity,
        now: Instant,
    ) -> Vec<RoomCount> {
        let mut rooms: BTreeMap<RoomId, RoomCount> = record
            .rooms
            .iter()
            .map(|(id, r)| {
                let count = RoomCount {
                    id: *id,
                    occupied: r.players,
                    capacity: r.capacity,
                    open: r.status == RoomStatus::Open || r.status == RoomStatus::Full,
                };
                (*id, count)
            })
            .collect();

        for r in self.reservations.values() {
            if r.worker != worker || r.expires_at <= now {
                continue;
            }
            rooms
                .entry(r.room)
                .or_insert(RoomCount {
                    id: r.room,
                    occupied: 0,
                    capacity: capacity.room_capacity,
                    open: true,
                })
                .occupied += 1;
        }
        rooms.into_values().collect()
    }

    fn allocate_room_id(&mut self) -> RoomId {
        loop {
            let id = RoomId(self.next_room_id);
            self.next_room_id = self.next_room_id.wrapping_add(1).max(1);
            if !self.owners.contains_key(&id) {
                return id;
            }
        }
    }

    fn fresh_ticket(&self) -> u64 {
        loop {
            let ticket: u64 = rand::random();
            if ticket != 0 && !self.reservations.contains_key(&ticket) {
                return ticket;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Entries for every enabled worker, in id order.
    pub fn server_list(&self, now: Instant) -> Vec<ServerListEntry> {
        self.workers
            .iter()
            .filter(|(_, w)| w.config.enabled)
            .map(|(id, w)| {
                let view = self.view(*id, w, now);
                ServerListEntry {
                    worker_id: id.0,
                    name: w.config.name.clone(),
                    flag: w.config.flag.clone(),
                    address: view.address,
                    rooms: view.rooms,
                    max_rooms: view.max_rooms,
                    players: view.players + view.pending,
                    available: view.availability == Availability::Available,
                }
            })
            .collect()
    }

    /// Every configured worker, in id order.
    pub fn workers(&self, now: Instant) -> Vec<WorkerView> {
        self.workers
            .iter()
            .map(|(id, w)| self.view(*id, w, now))
            .collect()
    }

    fn view(&self, id: WorkerId, record: &WorkerRecord, now: Instant) -> WorkerView {
        let pending = self
            .reservations
            .values()
            .filter(|r| r.worker == id && r.expires_at > now)
            .count() as u32;
        let rooms = match record.capacity {
            Some(capacity) => self.room_counts(id, record, capacity, now).len() as u32,
            None => 0,
        };
        WorkerView {
            id,
            name: record.config.name.clone(),
            address: record.config.url(),
            enabled: record.config.enabled,
            availability: record.availability,
            rooms,
            max_rooms: record.capacity.map_or(0, |c| c.max_rooms),
            players: record.rooms.values().map(|r| r.players).sum(),
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: u32) -> WorkerEntryConfig {
        WorkerEntryConfig {
            id: WorkerId(id),
            name: format!("w{id}"),
            flag: "pl".into(),
            address: format!("127.0.0.1:{}", 10_000 + id),
            enabled: true,
        }
    }

    fn capacity(max_rooms: u32, room_capacity: u32) -> WorkerCapacity {
        WorkerCapacity {
            max_rooms,
            room_capacity,
            tick_interval_ms: 50,
        }
    }

    fn lobby(ids: &[u32]) -> Lobby {
        let configs: Vec<_> = ids.iter().map(|id| worker(*id)).collect();
        Lobby::new(&configs, Duration::from_secs(5))
    }

    fn load(room: u64, players: u32) -> RoomLoad {
        RoomLoad {
            room_id: RoomId(room),
            players,
            capacity: 4,
            status: if players >= 4 { RoomStatus::Full } else { RoomStatus::Open },
        }
    }

    fn client(n: u64) -> ClientId {
        ClientId::new(n)
    }

    // =====================================================================
    // Registry
    // =====================================================================

    #[test]
    fn test_register_unknown_worker_is_rejected() {
        let mut lobby = lobby(&[1]);
        let err = lobby
            .register(WorkerId(9), capacity(2, 4), Instant::now())
            .unwrap_err();
        assert_eq!(err, LobbyError::UnknownWorker(WorkerId(9)));
    }

    #[test]
    fn test_register_disabled_worker_is_rejected() {
        let mut disabled = worker(1);
        disabled.enabled = false;
        let mut lobby = Lobby::new(&[disabled], Duration::from_secs(5));
        assert!(lobby.register(WorkerId(1), capacity(2, 4), Instant::now()).is_err());
        assert!(lobby.server_list(Instant::now()).is_empty());
    }

    #[test]
    fn test_unregistered_worker_is_not_a_candidate() {
        let mut lobby = lobby(&[1]);
        assert_eq!(
            lobby.handle_join_request(client(1), Instant::now()),
            Err(LobbyError::NoCapacity)
        );
    }

    #[test]
    fn test_heartbeat_before_register_is_rejected() {
        let mut lobby = lobby(&[1]);
        assert!(lobby.heartbeat(WorkerId(1), &[], &[], Instant::now()).is_err());
    }

    // =====================================================================
    // Matchmaking
    // =====================================================================

    #[test]
    fn test_ninth_join_on_two_by_four_has_no_capacity() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();

        let rooms: Vec<RoomId> = (1..=8)
            .map(|n| lobby.handle_join_request(client(n), now).unwrap().room)
            .collect();
        assert_eq!(&rooms[..4], &[RoomId(1); 4]);
        assert_eq!(&rooms[4..], &[RoomId(2); 4]);

        assert_eq!(
            lobby.handle_join_request(client(9), now),
            Err(LobbyError::NoCapacity)
        );
    }

    #[test]
    fn test_assignment_carries_worker_details() {
        let now = Instant::now();
        let mut lobby = lobby(&[3]);
        lobby.register(WorkerId(3), capacity(2, 4), now).unwrap();

        let a = lobby.handle_join_request(client(1), now).unwrap();
        assert_eq!(a.worker, WorkerId(3));
        assert_eq!(a.address, "ws://127.0.0.1:10003");
        assert_eq!(a.tick_interval_ms, 50);
        assert_ne!(a.ticket, 0);
        assert_eq!(lobby.owner_of(a.room), Some(WorkerId(3)));
    }

    #[test]
    fn test_equal_load_goes_to_lowest_worker_id() {
        let now = Instant::now();
        let mut lobby = lobby(&[2, 1]);
        lobby.register(WorkerId(2), capacity(2, 4), now).unwrap();
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();

        let first = lobby.handle_join_request(client(1), now).unwrap();
        assert_eq!(first.worker, WorkerId(1));
        // Worker 1 now holds 1/8, worker 2 holds 0/8.
        let second = lobby.handle_join_request(client(2), now).unwrap();
        assert_eq!(second.worker, WorkerId(2));
        let third = lobby.handle_join_request(client(3), now).unwrap();
        assert_eq!(third.worker, WorkerId(1));
    }

    #[test]
    fn test_load_ratio_accounts_for_size() {
        let now = Instant::now();
        let mut lobby = lobby(&[1, 2]);
        lobby.register(WorkerId(1), capacity(1, 2), now).unwrap();
        lobby.register(WorkerId(2), capacity(4, 4), now).unwrap();

        lobby.heartbeat(WorkerId(1), &[], &[], now).unwrap();
        lobby
            .heartbeat(WorkerId(2), &[load(10, 4), load(11, 1)], &[], now)
            .unwrap();
        // Worker 1: 0/2. Worker 2: 5/16.
        assert_eq!(lobby.handle_join_request(client(1), now).unwrap().worker, WorkerId(1));
        // Worker 1: 1/2 = 0.5 > 5/16.
        let next = lobby.handle_join_request(client(2), now).unwrap();
        assert_eq!(next.worker, WorkerId(2));
        assert_eq!(next.room, RoomId(11));
    }

    #[test]
    fn test_closing_room_is_skipped() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();
        let closing = RoomLoad {
            status: RoomStatus::Closing,
            ..load(5, 1)
        };
        lobby.heartbeat(WorkerId(1), &[closing], &[], now).unwrap();

        let a = lobby.handle_join_request(client(1), now).unwrap();
        assert_ne!(a.room, RoomId(5));
    }

    #[test]
    fn test_allocated_ids_skip_reported_rooms() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(3, 1), now).unwrap();
        let full = RoomLoad {
            capacity: 1,
            status: RoomStatus::Full,
            ..load(1, 1)
        };
        lobby.heartbeat(WorkerId(1), &[full], &[], now).unwrap();

        let a = lobby.handle_join_request(client(1), now).unwrap();
        assert_eq!(a.room, RoomId(2));
    }

    #[test]
    fn test_draining_worker_takes_no_players() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();
        lobby.set_draining(WorkerId(1));

        assert_eq!(lobby.availability(WorkerId(1)), Some(Availability::Draining));
        assert_eq!(
            lobby.handle_join_request(client(1), now),
            Err(LobbyError::NoCapacity)
        );
    }

    // =====================================================================
    // Reconciliation and expiry
    // =====================================================================

    #[test]
    fn test_redeemed_ticket_is_not_counted_twice() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(1, 2), now).unwrap();

        let a = lobby.handle_join_request(client(1), now).unwrap();
        assert_eq!(lobby.pending_reservations(), 1);

        let report = RoomLoad {
            capacity: 2,
            ..load(a.room.0, 1)
        };
        lobby.heartbeat(WorkerId(1), &[report], &[a.ticket], now).unwrap();
        assert_eq!(lobby.pending_reservations(), 0);

        // One reported player, one free slot left.
        let b = lobby.handle_join_request(client(2), now).unwrap();
        assert_eq!(b.room, a.room);
        assert_eq!(
            lobby.handle_join_request(client(3), now),
            Err(LobbyError::NoCapacity)
        );
    }

    #[test]
    fn test_unredeemed_reservation_expires() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(1, 1), now).unwrap();
        lobby.handle_join_request(client(1), now).unwrap();
        assert_eq!(
            lobby.handle_join_request(client(2), now),
            Err(LobbyError::NoCapacity)
        );

        let later = now + Duration::from_secs(5);
        lobby.heartbeat(WorkerId(1), &[], &[], later).unwrap();
        lobby.expire(later, Duration::from_secs(10));
        assert_eq!(lobby.pending_reservations(), 0);
        assert_eq!(lobby.owner_of(RoomId(1)), None);
        assert!(lobby.handle_join_request(client(2), later).is_ok());
    }

    #[test]
    fn test_silent_worker_becomes_unavailable_and_loses_rooms() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();
        lobby.heartbeat(WorkerId(1), &[load(7, 2)], &[], now).unwrap();
        assert_eq!(lobby.owner_of(RoomId(7)), Some(WorkerId(1)));

        let timeout = Duration::from_secs(3);
        assert!(lobby.expire(now + Duration::from_secs(2), timeout).is_empty());
        let expired = lobby.expire(now + timeout, timeout);
        assert_eq!(expired, vec![WorkerId(1)]);
        assert_eq!(lobby.availability(WorkerId(1)), Some(Availability::Unavailable));
        assert_eq!(lobby.owner_of(RoomId(7)), None);
    }

    #[test]
    fn test_heartbeat_revives_unavailable_worker() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();
        lobby.mark_unavailable(WorkerId(1));

        lobby.heartbeat(WorkerId(1), &[], &[], now).unwrap();
        assert_eq!(lobby.availability(WorkerId(1)), Some(Availability::Available));
    }

    #[test]
    fn test_room_is_owned_by_one_worker() {
        let now = Instant::now();
        let mut lobby = lobby(&[1, 2]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();
        lobby.register(WorkerId(2), capacity(2, 4), now).unwrap();

        lobby.heartbeat(WorkerId(1), &[load(4, 1)], &[], now).unwrap();
        lobby.heartbeat(WorkerId(2), &[load(4, 3)], &[], now).unwrap();
        assert_eq!(lobby.owner_of(RoomId(4)), Some(WorkerId(1)));
    }

    #[test]
    fn test_deregister_drops_pending_reservations() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();
        let a = lobby.handle_join_request(client(1), now).unwrap();

        let lost = lobby.deregister(WorkerId(1));
        assert_eq!(lost, vec![a.room]);
        assert_eq!(lobby.pending_reservations(), 0);
        assert_eq!(lobby.availability(WorkerId(1)), Some(Availability::Unregistered));
    }

    #[test]
    fn test_cancel_releases_the_slot() {
        let now = Instant::now();
        let mut lobby = lobby(&[1]);
        lobby.register(WorkerId(1), capacity(1, 1), now).unwrap();
        let a = lobby.handle_join_request(client(1), now).unwrap();
        lobby.cancel(a.ticket);
        assert!(lobby.handle_join_request(client(2), now).is_ok());
    }

    // =====================================================================
    // Views
    // =====================================================================

    #[test]
    fn test_server_list_counts_pending_players() {
        let now = Instant::now();
        let mut lobby = lobby(&[1, 2]);
        lobby.register(WorkerId(1), capacity(2, 4), now).unwrap();
        lobby.heartbeat(WorkerId(1), &[load(1, 2)], &[], now).unwrap();
        lobby.handle_join_request(client(1), now).unwrap();

        let list = lobby.server_list(now);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].worker_id, 1);
        assert_eq!(list[0].name, "w1");
        assert_eq!(list[0].flag, "pl");
        assert_eq!(list[0].rooms, 1);
        assert_eq!(list[0].max_rooms, 2);
        assert_eq!(list[0].players, 3);
        assert!(list[0].available);
        assert!(!list[1].available);
        assert_eq!(list[1].max_rooms, 0);
    }
}
