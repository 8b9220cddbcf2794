//! Hub configuration.

use std::collections::HashSet;
use std::time::Duration;

use roomrelay_transport::ConnectionConfig;
use serde::{Deserialize, Serialize};

use crate::WorkerId;

/// One worker the hub is allowed to talk to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEntryConfig {
    pub id: WorkerId,
    pub name: String,
    #[serde(default)]
    pub flag: String,
    /// `host:port` of the worker listener, or a full `ws://` URL.
    pub address: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl WorkerEntryConfig {
    /// The URL both the hub and redirected clients dial.
    pub fn url(&self) -> String {
        if self.address.starts_with("ws://") || self.address.starts_with("wss://") {
            self.address.clone()
        } else {
            format!("ws://{}", self.address)
        }
    }
}

/// Static settings for the hub process. Loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Address the client listener binds to.
    pub endpoint: String,
    /// Sent to workers in `HubHello`.
    pub hub_name: String,
    pub lobby_tick_ms: u64,
    /// Expected heartbeat cadence; also the redial delay for dropped links.
    pub worker_status_interval_ms: u64,
    /// A worker silent for this long is marked unavailable.
    pub heartbeat_timeout_ms: u64,
    /// How long an unredeemed assignment counts toward occupancy.
    pub reservation_ttl_ms: u64,
    pub client_ping_interval_ms: u64,
    pub idle_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub outbound_buffer: usize,
    pub workers: Vec<WorkerEntryConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:10000".into(),
            hub_name: "roomrelay-hub".into(),
            lobby_tick_ms: 100,
            worker_status_interval_ms: 1_000,
            heartbeat_timeout_ms: 5_000,
            reservation_ttl_ms: 5_000,
            client_ping_interval_ms: 5_000,
            idle_timeout_ms: 15_000,
            handshake_timeout_ms: 5_000,
            outbound_buffer: 64,
            workers: Vec::new(),
        }
    }
}

impl HubConfig {
    /// Clamps values that would stall the hub and drops duplicate worker ids.
    pub fn validated(mut self) -> Self {
        if self.lobby_tick_ms == 0 {
            tracing::warn!("lobby_tick_ms of 0 clamped to 1");
            self.lobby_tick_ms = 1;
        }
        if self.worker_status_interval_ms == 0 {
            tracing::warn!("worker_status_interval_ms of 0 clamped to 1000");
            self.worker_status_interval_ms = 1_000;
        }
        if self.heartbeat_timeout_ms < self.worker_status_interval_ms {
            tracing::warn!(
                heartbeat_timeout_ms = self.heartbeat_timeout_ms,
                "heartbeat timeout shorter than the status interval, raised to match"
            );
            self.heartbeat_timeout_ms = self.worker_status_interval_ms;
        }
        if self.outbound_buffer == 0 {
            tracing::warn!("outbound_buffer of 0 clamped to 1");
            self.outbound_buffer = 1;
        }

        let mut seen = HashSet::new();
        self.workers.retain(|w| {
            let fresh = seen.insert(w.id);
            if !fresh {
                tracing::warn!(worker = %w.id, name = %w.name, "duplicate worker id ignored");
            }
            fresh
        });
        self
    }

    pub fn lobby_tick(&self) -> Duration {
        Duration::from_millis(self.lobby_tick_ms)
    }

    pub fn worker_status_interval(&self) -> Duration {
        Duration::from_millis(self.worker_status_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_millis(self.reservation_ttl_ms)
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
