//! Bounce: a shared field of objects drifting inside a rectangular viewport.
//!
//! The field belongs to the room, not to any member, so members own no
//! per-client state. Members may resize the viewport (`SetViewport`) and
//! change the population (`SetCount`). The field is rebuilt from the room's
//! seeded RNG whenever the population changes.

use std::time::Duration;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roomrelay_protocol::{Packet, RoomId};
use roomrelay_room::{Emit, LogicFault, Objects, RoomLogic};
use roomrelay_transport::ClientId;

pub const DEFAULT_COUNT: u32 = 100;
/// Upper bound on `SetCount`; larger requests are clamped.
pub const MAX_COUNT: u32 = 10_000;
/// Units per second.
pub const OBJECT_SPEED: f32 = 100.0;
pub const DEFAULT_VIEWPORT: Vec2 = Vec2::new(512.0, 512.0);

#[derive(Debug, Clone, PartialEq)]
pub struct BounceObject {
    pub position: Vec2,
    pub direction: Vec2,
}

pub struct BounceGame {
    rng: StdRng,
    viewport: Vec2,
    count: u32,
    objects: Vec<BounceObject>,
}

impl BounceGame {
    /// The field is seeded from the room id, so two rooms with the same id
    /// and the same inputs evolve identically.
    pub fn new(room: RoomId) -> Self {
        Self {
            rng: StdRng::seed_from_u64(room.0),
            viewport: DEFAULT_VIEWPORT,
            count: DEFAULT_COUNT,
            objects: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn objects(&self) -> &[BounceObject] {
        &self.objects
    }

    fn respawn(&mut self) {
        let viewport = self.viewport;
        let rng = &mut self.rng;
        self.objects = (0..self.count)
            .map(|_| BounceObject {
                position: Vec2::new(rng.random_range(0.0..1.0), rng.random_range(0.0..1.0))
                    * viewport,
                direction: Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)),
            })
            .collect();
    }

    fn simulate(&mut self, dt: f32) {
        let viewport = self.viewport;
        for object in &mut self.objects {
            object.position += object.direction * (OBJECT_SPEED * dt);

            let d = &mut object.direction;
            if object.position.x < 0.0 {
                d.x = d.x.abs();
            } else if object.position.x > viewport.x {
                d.x = -d.x.abs();
            }
            if object.position.y < 0.0 {
                d.y = d.y.abs();
            } else if object.position.y > viewport.y {
                d.y = -d.y.abs();
            }
        }
    }
}

impl RoomLogic for BounceGame {
    type Object = ();

    fn spawn(&mut self, _client: ClientId, _slot: usize) {}

    fn on_join(&mut self, _objects: &Objects<()>, client: ClientId) -> Vec<Emit> {
        vec![Emit::to_client(client, Packet::SetCount { count: self.count })]
    }

    fn apply_input(
        &mut self,
        _objects: &mut Objects<()>,
        client: ClientId,
        packet: Packet,
    ) -> Result<Vec<Emit>, LogicFault> {
        match packet {
            Packet::SetViewport { size } => {
                if !(size.x.is_finite() && size.y.is_finite() && size.x > 0.0 && size.y > 0.0) {
                    tracing::debug!(%client, ?size, "ignoring invalid viewport");
                    return Ok(Vec::new());
                }
                self.viewport = size;
                Ok(vec![
                    Emit::to_all(Packet::SetViewport { size }).caused_by(client).with_echo(),
                ])
            }
            Packet::SetCount { count } => {
                let count = count.min(MAX_COUNT);
                if count != self.count {
                    self.count = count;
                    self.objects.clear();
                }
                Ok(vec![Emit::to_all(Packet::SetCount { count }).caused_by(client)])
            }
            other => {
                tracing::debug!(%client, packet = other.name(), "bounce ignores packet");
                Ok(Vec::new())
            }
        }
    }

    fn step(
        &mut self,
        _objects: &mut Objects<()>,
        tick: u64,
        dt: Duration,
    ) -> Result<Vec<Emit>, LogicFault> {
        if self.objects.len() != self.count as usize {
            self.respawn();
        }
        self.simulate(dt.as_secs_f32());

        let positions = self.objects.iter().map(|o| o.position).collect();
        Ok(vec![Emit::to_all(Packet::ObjectPositions { tick, positions })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Duration = Duration::from_millis(50);

    fn step(game: &mut BounceGame, tick: u64) -> Vec<Emit> {
        game.step(&mut Objects::new(), tick, DT).unwrap()
    }

    #[test]
    fn test_first_step_spawns_default_field() {
        let mut game = BounceGame::new(RoomId(1));
        let emits = step(&mut game, 1);
        let Packet::ObjectPositions { tick, positions } = &emits[0].packet else {
            panic!("expected positions");
        };
        assert_eq!(*tick, 1);
        assert_eq!(positions.len(), DEFAULT_COUNT as usize);
    }

    #[test]
    fn test_same_room_id_same_field() {
        let mut a = BounceGame::new(RoomId(42));
        let mut b = BounceGame::new(RoomId(42));
        for t in 1..=5 {
            assert_eq!(step(&mut a, t), step(&mut b, t));
        }
        let mut c = BounceGame::new(RoomId(43));
        step(&mut c, 1);
        assert_ne!(a.objects()[0], c.objects()[0]);
    }

    #[test]
    fn test_objects_bounce_back_inside() {
        let mut game = BounceGame::new(RoomId(1));
        game.objects = vec![BounceObject {
            position: Vec2::new(511.0, 10.0),
            direction: Vec2::new(1.0, 0.0),
        }];
        game.count = 1;
        game.simulate(0.05);
        assert!(game.objects[0].position.x > 512.0);
        assert_eq!(game.objects[0].direction.x, -1.0);
    }

    #[test]
    fn test_set_count_relayed_to_others_only() {
        let mut game = BounceGame::new(RoomId(1));
        let c = ClientId::new(2);
        let out = game
            .apply_input(&mut Objects::new(), c, Packet::SetCount { count: 7 })
            .unwrap();
        assert_eq!(out[0].origin, Some(c));
        assert!(!out[0].echo);
        assert_eq!(game.count(), 7);

        let emits = step(&mut game, 1);
        let Packet::ObjectPositions { positions, .. } = &emits[0].packet else {
            panic!("expected positions");
        };
        assert_eq!(positions.len(), 7);
    }

    #[test]
    fn test_set_count_clamped() {
        let mut game = BounceGame::new(RoomId(1));
        game.apply_input(&mut Objects::new(), ClientId::new(1), Packet::SetCount { count: u32::MAX })
            .unwrap();
        assert_eq!(game.count(), MAX_COUNT);
    }

    #[test]
    fn test_set_viewport_echoes() {
        let mut game = BounceGame::new(RoomId(1));
        let c = ClientId::new(2);
        let size = Vec2::new(800.0, 600.0);
        let out = game
            .apply_input(&mut Objects::new(), c, Packet::SetViewport { size })
            .unwrap();
        assert!(out[0].echo);
        assert_eq!(game.viewport(), size);
    }

    #[test]
    fn test_invalid_viewport_ignored() {
        let mut game = BounceGame::new(RoomId(1));
        let out = game
            .apply_input(
                &mut Objects::new(),
                ClientId::new(1),
                Packet::SetViewport {
                    size: Vec2::new(-1.0, f32::INFINITY),
                },
            )
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(game.viewport(), DEFAULT_VIEWPORT);
    }

    #[test]
    fn test_joiner_greeted_with_count() {
        let mut game = BounceGame::new(RoomId(1));
        let c = ClientId::new(5);
        let emits = game.on_join(&Objects::new(), c);
        assert_eq!(emits, vec![Emit::to_client(c, Packet::SetCount { count: DEFAULT_COUNT })]);
    }
}
