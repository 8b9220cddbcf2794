use std::time::Duration;

/// Per-connection limits shared by accepted and dialed connections.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on the WebSocket upgrade.
    pub handshake_timeout: Duration,
    /// A connection that sends nothing (not even a pong) for this long is
    /// dropped. Also bounds every socket write, so a peer that stops
    /// reading is dropped too.
    pub idle_timeout: Duration,
    /// How often the server pings the peer to measure RTT and keep the
    /// connection alive.
    pub ping_interval: Duration,
    /// Capacity of the outbound frame queue. Overflow disconnects the client.
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            ping_interval: Duration::from_secs(5),
            outbound_buffer: 256,
        }
    }
}
