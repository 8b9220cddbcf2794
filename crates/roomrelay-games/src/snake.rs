//! Snake: every member steers a five-node snake around an open field.
//!
//! Clients send `PlayerInput { heading }` to set where they want to go. On
//! each step the real heading turns toward that target at a bounded rate,
//! the head advances, and every following node is dragged to a fixed
//! distance behind its parent. The full state of all snakes goes out as
//! one `TickData` broadcast per tick.
//!
//! Each snake keeps its last few ticks. An input stamped with a tick that
//! was already simulated rewinds the snake to that tick and replays the
//! recorded steps with the new heading, so a slow link steers from the
//! moment the player pressed the key. Inputs older than the history start
//! from its oldest tick.

use std::collections::VecDeque;
use std::f32::consts::{PI, TAU};
use std::time::Duration;

use glam::Vec2;
use roomrelay_protocol::{Packet, TickPlayer};
use roomrelay_room::{Emit, LogicFault, Objects, RoomLogic};
use roomrelay_transport::ClientId;

/// Radians per second the heading can turn.
pub const ROTATION_SPEED: f32 = 1.2;
/// Head speed in units per second.
pub const MOVEMENT_SPEED: f32 = 150.0;
pub const DISTANCE_BETWEEN_NODES: f32 = 30.0;
pub const NODE_COUNT: usize = 5;

const SPAWN_ORIGIN: Vec2 = Vec2::new(100.0, 100.0);
/// Vertical gap between the spawn lines of consecutive slots.
const SLOT_SPACING: f32 = 60.0;
/// Ticks kept for late inputs when no history length is configured.
pub const DEFAULT_INPUT_HISTORY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Snake {
    /// Head first.
    pub nodes: Vec<Vec2>,
    pub heading_real: f32,
    pub heading_target: f32,
    /// Heading set since the last step, recorded with the next one.
    steered: Option<f32>,
    /// Oldest first.
    history: VecDeque<Frame>,
}

/// Everything a step reads.
#[derive(Debug, Clone, PartialEq)]
struct Pose {
    nodes: Vec<Vec2>,
    heading_real: f32,
    heading_target: f32,
}

/// One simulated tick: the pose it started from and the input that
/// applies from it.
#[derive(Debug, Clone, PartialEq)]
struct Frame {
    tick: u64,
    dt: f32,
    before: Pose,
    input: Option<f32>,
}

impl Snake {
    /// A straight snake lying along +x, head at the right end.
    pub fn spawn(slot: usize) -> Self {
        let origin = SPAWN_ORIGIN + Vec2::new(0.0, slot as f32 * SLOT_SPACING);
        let nodes = (0..NODE_COUNT)
            .rev()
            .map(|i| origin + Vec2::new(DISTANCE_BETWEEN_NODES * i as f32, 0.0))
            .collect();
        Self {
            nodes,
            heading_real: 0.0,
            heading_target: 0.0,
            steered: None,
            history: VecDeque::new(),
        }
    }

    /// Steers toward `heading` from the next step on.
    pub fn steer(&mut self, heading: f32) {
        self.heading_target = wrap_angle(heading);
        self.steered = Some(self.heading_target);
    }

    /// Records `tick` in the history, keeping at most `keep` ticks, then
    /// simulates it.
    fn advance(&mut self, tick: u64, dt: f32, keep: usize) {
        let input = self.steered.take();
        if keep > 0 {
            self.history.push_back(Frame {
                tick,
                dt,
                before: self.pose(),
                input,
            });
            while self.history.len() > keep {
                self.history.pop_front();
            }
        }
        self.simulate(dt);
    }

    /// Replays the recorded ticks from `from` on with `heading` applied at
    /// the first of them. Returns `false` when `from` has not been
    /// simulated yet.
    fn rewind(&mut self, from: u64, heading: f32) -> bool {
        let Some(start) = self.history.iter().position(|f| f.tick >= from) else {
            return false;
        };
        let pending = self.steered;
        self.history[start].input = Some(wrap_angle(heading));
        let before = self.history[start].before.clone();
        self.restore(before);

        for i in start..self.history.len() {
            self.history[i].before = self.pose();
            let (dt, input) = (self.history[i].dt, self.history[i].input);
            if let Some(heading) = input {
                self.heading_target = heading;
            }
            self.simulate(dt);
        }
        if let Some(heading) = pending {
            self.heading_target = heading;
        }
        true
    }

    fn pose(&self) -> Pose {
        Pose {
            nodes: self.nodes.clone(),
            heading_real: self.heading_real,
            heading_target: self.heading_target,
        }
    }

    fn restore(&mut self, pose: Pose) {
        self.nodes = pose.nodes;
        self.heading_real = pose.heading_real;
        self.heading_target = pose.heading_target;
    }

    /// Advances the snake by `dt` seconds.
    pub fn simulate(&mut self, dt: f32) {
        let diff = wrap_angle(self.heading_target - self.heading_real);
        let max_turn = ROTATION_SPEED * dt;
        self.heading_real = wrap_angle(self.heading_real + diff.clamp(-max_turn, max_turn));

        let Some(head) = self.nodes.first_mut() else {
            return;
        };
        *head += Vec2::from_angle(self.heading_real) * (MOVEMENT_SPEED * dt);

        for i in 1..self.nodes.len() {
            let parent = self.nodes[i - 1];
            let offset = self.nodes[i] - parent;
            if offset.length() > DISTANCE_BETWEEN_NODES {
                self.nodes[i] = parent + offset.normalize_or_zero() * DISTANCE_BETWEEN_NODES;
            }
        }
    }
}

/// Maps an angle into `(-PI, PI]`.
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

// ---------------------------------------------------------------------------
// RoomLogic
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SnakeGame {
    /// Ticks each snake keeps for rewinding. Zero disables rewinds.
    history: usize,
}

impl SnakeGame {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_INPUT_HISTORY)
    }

    /// A game whose snakes remember the last `ticks` steps.
    pub fn with_history(ticks: usize) -> Self {
        Self { history: ticks }
    }
}

impl Default for SnakeGame {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomLogic for SnakeGame {
    type Object = Snake;

    fn spawn(&mut self, _client: ClientId, slot: usize) -> Snake {
        Snake::spawn(slot)
    }

    fn apply_input(
        &mut self,
        objects: &mut Objects<Snake>,
        client: ClientId,
        packet: Packet,
    ) -> Result<Vec<Emit>, LogicFault> {
        match packet {
            Packet::PlayerInput {
                sequence,
                tick,
                heading,
            } => {
                if !heading.is_finite() {
                    tracing::debug!(%client, sequence, "ignoring non-finite heading");
                    return Ok(Vec::new());
                }
                let Some(snake) = objects.get_mut(&client) else {
                    return Ok(Vec::new());
                };
                if tick > 0 && snake.rewind(tick, heading) {
                    tracing::trace!(%client, sequence, tick, "late input replayed");
                } else {
                    snake.steer(heading);
                }
            }
            other => {
                tracing::debug!(%client, packet = other.name(), "snake ignores packet");
            }
        }
        Ok(Vec::new())
    }

    fn step(
        &mut self,
        objects: &mut Objects<Snake>,
        tick: u64,
        dt: Duration,
    ) -> Result<Vec<Emit>, LogicFault> {
        let dt = dt.as_secs_f32();
        let mut players = Vec::with_capacity(objects.len());
        for (client, snake) in objects.iter_mut() {
            snake.advance(tick, dt, self.history);
            if snake.nodes.iter().any(|n| !n.x.is_finite() || !n.y.is_finite()) {
                return Err(LogicFault(format!("{client} left the finite plane")));
            }
            players.push(TickPlayer {
                player_id: client.into_inner(),
                heading: snake.heading_real,
                nodes: snake.nodes.clone(),
            });
        }
        Ok(vec![Emit::to_all(Packet::TickData { tick, players })])
    }
}
