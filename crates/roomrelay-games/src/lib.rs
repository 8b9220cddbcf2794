//! Demo games that run on roomrelay workers.
//!
//! - [`SnakeGame`]: every member steers a five-node snake.
//! - [`BounceGame`]: a shared field of objects bouncing inside a viewport.
//!
//! Both are deterministic for a given join order, input sequence and `dt`.

mod bounce;
mod snake;

pub use bounce::{BounceGame, BounceObject};
pub use snake::{DEFAULT_INPUT_HISTORY, Snake, SnakeGame};

use serde::{Deserialize, Serialize};

/// Which game a worker hosts, as named in its config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    #[default]
    Snake,
    Bounce,
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snake => f.write_str("snake"),
            Self::Bounce => f.write_str("bounce"),
        }
    }
}
