//! Runs the demo games inside real rooms.

use std::time::Duration;

use roomrelay_games::{BounceGame, SnakeGame};
use roomrelay_protocol::{Packet, RoomId, Vec2};
use roomrelay_room::{Room, RoomConfig};
use roomrelay_transport::ClientId;

const DT: Duration = Duration::from_millis(50);

fn c(n: u64) -> ClientId {
    ClientId::new(n)
}

fn steer(sequence: u32, tick: u64, heading: f32) -> Packet {
    Packet::PlayerInput {
        sequence,
        tick,
        heading,
    }
}

// =========================================================================
// Snake
// =========================================================================

#[test]
fn test_snake_room_broadcasts_every_member() {
    let mut room = Room::new(RoomId(1), RoomConfig::default(), SnakeGame::new());
    room.join(c(1)).unwrap();
    room.join(c(2)).unwrap();

    let queue = room.tick(DT).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].destinations, vec![c(1), c(2)]);
    let Packet::TickData { players, .. } = &queue[0].packet else {
        panic!("expected tick data");
    };
    assert_eq!(players.len(), 2);
}

#[test]
fn test_snake_input_turns_only_its_owner() {
    let mut room = Room::new(RoomId(1), RoomConfig::default(), SnakeGame::new());
    room.join(c(1)).unwrap();
    room.join(c(2)).unwrap();
    room.apply_input(c(2), steer(1, 0, 1.0)).unwrap();
    room.tick(DT).unwrap();

    assert_eq!(room.objects()[&c(1)].heading_real, 0.0);
    assert!(room.objects()[&c(2)].heading_real > 0.0);
}

#[test]
fn test_snake_rooms_are_deterministic() {
    let run = || {
        let mut room = Room::new(RoomId(3), RoomConfig::default(), SnakeGame::new());
        room.join(c(4)).unwrap();
        room.join(c(9)).unwrap();
        let mut out = Vec::new();
        for seq in 0..10u32 {
            room.apply_input(c(9), steer(seq, 0, seq as f32 * 0.3)).unwrap();
            out.extend(room.tick(DT).unwrap());
        }
        out
    };
    assert_eq!(run(), run());
}

#[test]
fn test_snake_late_input_rewinds_to_its_tick() {
    let play = |late: bool| {
        let mut room = Room::new(RoomId(2), RoomConfig::default(), SnakeGame::with_history(4));
        room.join(c(1)).unwrap();
        room.join(c(2)).unwrap();
        for _ in 0..2 {
            room.tick(DT).unwrap();
        }
        if !late {
            room.apply_input(c(1), steer(1, 3, -1.0)).unwrap();
        }
        for _ in 0..3 {
            room.tick(DT).unwrap();
        }
        if late {
            // Arrives two ticks after the one it was stamped for.
            room.apply_input(c(1), steer(1, 3, -1.0)).unwrap();
        }
        room.tick(DT).unwrap();
        room.objects()[&c(1)].clone()
    };
    let (on_time, late) = (play(false), play(true));
    assert_eq!(on_time.nodes, late.nodes);
    assert_eq!(on_time.heading_real, late.heading_real);
}

// =========================================================================
// Bounce
// =========================================================================

#[test]
fn test_bounce_room_relays_and_greets() {
    let mut room = Room::new(RoomId(5), RoomConfig::default(), BounceGame::new(RoomId(5)));
    room.join(c(1)).unwrap();
    room.join(c(2)).unwrap();
    room.join(c(3)).unwrap();

    // First tick: one greeting per joiner, then the field.
    let queue = room.tick(DT).unwrap();
    let greetings: Vec<_> = queue
        .iter()
        .filter(|p| matches!(p.packet, Packet::SetCount { .. }))
        .collect();
    assert_eq!(greetings.len(), 3);

    room.apply_input(c(2), Packet::SetCount { count: 10 }).unwrap();
    room.apply_input(
        c(3),
        Packet::SetViewport {
            size: Vec2::new(300.0, 200.0),
        },
    )
    .unwrap();
    let queue = room.tick(DT).unwrap();

    let count = queue.iter().find(|p| p.packet == Packet::SetCount { count: 10 }).unwrap();
    assert_eq!(count.destinations, vec![c(1), c(3)]);
    let viewport = queue
        .iter()
        .find(|p| matches!(p.packet, Packet::SetViewport { .. }))
        .unwrap();
    assert_eq!(viewport.destinations, vec![c(1), c(2), c(3)]);
    assert_eq!(room.logic().objects().len(), 10);
}
