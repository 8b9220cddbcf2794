//! Join tickets announced by the hub, waiting for their client.

use std::collections::HashMap;

use roomrelay_protocol::RoomId;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Reservation {
    room: RoomId,
    expires_at: Instant,
}

/// Outstanding reservations keyed by ticket.
#[derive(Debug, Default)]
pub(crate) struct Reservations {
    by_ticket: HashMap<u64, Reservation>,
}

impl Reservations {
    pub(crate) fn insert(&mut self, room: RoomId, ticket: u64, expires_at: Instant) {
        self.by_ticket.insert(ticket, Reservation { room, expires_at });
    }

    /// Consumes `ticket` if it was issued for `room` and has not expired.
    pub(crate) fn redeem(&mut self, room: RoomId, ticket: u64, now: Instant) -> bool {
        match self.by_ticket.get(&ticket) {
            Some(r) if r.room == room && r.expires_at > now => {
                self.by_ticket.remove(&ticket);
                true
            }
            _ => false,
        }
    }

    /// Drops expired reservations and returns how many went.
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let before = self.by_ticket.len();
        self.by_ticket.retain(|_, r| r.expires_at > now);
        before - self.by_ticket.len()
    }

    /// Whether any live reservation targets `room`.
    pub(crate) fn holds(&self, room: RoomId) -> bool {
        self.by_ticket.values().any(|r| r.room == room)
    }

    pub(crate) fn clear(&mut self) {
        self.by_ticket.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_ticket.len()
    }
}
