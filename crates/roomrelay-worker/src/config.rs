//! Worker configuration.

use std::time::Duration;

use roomrelay_room::RoomConfig;
use roomrelay_transport::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// Static settings for one worker process. Loaded once at startup.
///
/// Every field has a default, so `{}` is a valid config file. Durations are
/// whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address the client listener binds to.
    pub endpoint: String,
    /// Must match the id the hub has for this worker.
    pub worker_id: u32,
    pub tick_interval_ms: u32,
    pub max_rooms: u32,
    pub room_capacity: u32,
    /// How often `WorkerStatus` goes to the hub.
    pub status_interval_ms: u64,
    /// How long a hub reservation stays redeemable.
    pub reservation_ttl_ms: u64,
    pub client_ping_interval_ms: u64,
    pub idle_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    /// Frames queued per client before it is dropped for backpressure.
    pub outbound_buffer: usize,
    /// Accept joins without a hub: `room_id = 0` picks or creates a room.
    pub standalone: bool,
    /// How late a stamped input may arrive and still be replayed from its
    /// tick. Zero turns replays off.
    pub input_max_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:10001".into(),
            worker_id: 1,
            tick_interval_ms: 50,
            max_rooms: 2,
            room_capacity: 4,
            status_interval_ms: 1_000,
            reservation_ttl_ms: 5_000,
            client_ping_interval_ms: 5_000,
            idle_timeout_ms: 15_000,
            handshake_timeout_ms: 5_000,
            outbound_buffer: 256,
            standalone: false,
            input_max_delay_ms: 200,
        }
    }
}

impl WorkerConfig {
    /// Clamps values that would stall or break the worker.
    pub fn validated(mut self) -> Self {
        if self.tick_interval_ms == 0 {
            tracing::warn!("tick_interval_ms of 0 clamped to 1");
            self.tick_interval_ms = 1;
        }
        if self.max_rooms == 0 {
            tracing::warn!("max_rooms of 0 clamped to 1");
            self.max_rooms = 1;
        }
        if self.room_capacity == 0 {
            tracing::warn!("room_capacity of 0 clamped to 1");
            self.room_capacity = 1;
        }
        if self.status_interval_ms == 0 {
            tracing::warn!("status_interval_ms of 0 clamped to tick interval");
            self.status_interval_ms = u64::from(self.tick_interval_ms);
        }
        if self.outbound_buffer == 0 {
            tracing::warn!("outbound_buffer of 0 clamped to 1");
            self.outbound_buffer = 1;
        }
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.tick_interval_ms))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_millis(self.reservation_ttl_ms)
    }

    /// Ticks a game keeps so inputs up to `input_max_delay_ms` late can
    /// be replayed.
    pub fn input_history(&self) -> usize {
        if self.input_max_delay_ms == 0 {
            return 0;
        }
        let ticks = self.input_max_delay_ms / u64::from(self.tick_interval_ms.max(1));
        usize::try_from(ticks).map_or(usize::MAX, |ticks| ticks.saturating_add(1))
    }

    pub fn room_config(&self) -> RoomConfig {
        RoomConfig::with_capacity(self.room_capacity as usize)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            ping_interval: Duration::from_millis(self.client_ping_interval_ms),
            outbound_buffer: self.outbound_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let cfg: WorkerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, WorkerConfig::default());
        assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_file() {
        let cfg: WorkerConfig =
            serde_json::from_str(r#"{"worker_id": 3, "max_rooms": 5, "standalone": true}"#).unwrap();
        assert_eq!(cfg.worker_id, 3);
        assert_eq!(cfg.max_rooms, 5);
        assert!(cfg.standalone);
        assert_eq!(cfg.room_capacity, 4);
    }

    #[test]
    fn test_validated_clamps_zeroes() {
        let cfg = WorkerConfig {
            tick_interval_ms: 0,
            max_rooms: 0,
            room_capacity: 0,
            status_interval_ms: 0,
            outbound_buffer: 0,
            ..WorkerConfig::default()
        }
        .validated();
        assert_eq!(cfg.tick_interval_ms, 1);
        assert_eq!(cfg.max_rooms, 1);
        assert_eq!(cfg.room_capacity, 1);
        assert_eq!(cfg.status_interval_ms, 1);
        assert_eq!(cfg.outbound_buffer, 1);
    }

    #[test]
    fn test_input_history_covers_the_allowed_delay() {
        assert_eq!(WorkerConfig::default().input_history(), 5);
        let cfg = WorkerConfig {
            tick_interval_ms: 30,
            input_max_delay_ms: 100,
            ..WorkerConfig::default()
        };
        assert_eq!(cfg.input_history(), 4);
        let off = WorkerConfig {
            input_max_delay_ms: 0,
            ..WorkerConfig::default()
        };
        assert_eq!(off.input_history(), 0);
    }

    #[test]
    fn test_round_trips_through_json() {
        let cfg = WorkerConfig {
            worker_id: 7,
            standalone: true,
            ..WorkerConfig::default()
        };
        let text = serde_json::to_string(&cfg).unwrap();
        assert!(text.contains("\"input_max_delay_ms\":200"));
        assert_eq!(serde_json::from_str::<WorkerConfig>(&text).unwrap(), cfg);
    }

    #[test]
    fn test_connection_settings() {
        let cfg = WorkerConfig {
            idle_timeout_ms: 900,
            ..WorkerConfig::default()
        };
        assert_eq!(cfg.connection().idle_timeout, Duration::from_millis(900));
        assert_eq!(cfg.room_config().capacity, 4);
    }
}
