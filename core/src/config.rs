//! Tunable knobs for the networking substrate.
//!
//! Mirrors the shape of the teacher's socket options builder: a plain struct
//! with `with_*` methods and a `Default` matching the documented defaults.

use std::time::Duration;

/// Maximum size of a single UDP datagram payload (65507, the IPv4 UDP
/// ceiling) minus the 24-byte wire header.
pub const DEFAULT_DATAGRAM_MAX: usize = 65_507 - 24;

/// Configuration for a [`Client`](../livewire/struct.Client.html) or
/// [`Server`](../livewire/struct.Server.html).
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Period between heartbeat datagrams sent on an established connection.
    pub heartbeat_period: Duration,

    /// Number of missed heartbeat periods before a connection is considered dead.
    pub disconnect_threshold: u32,

    /// How often the heartbeat watchdog checks for a stale connection.
    pub heartbeat_check_period: Duration,

    /// How long a client waits for a single connection attempt before retrying.
    pub connect_attempt_timeout: Duration,

    /// Maximum time to wait for a reliable-channel send to complete.
    pub reliable_send_timeout: Duration,

    /// Maximum payload size carried by the unreliable channel.
    pub datagram_max: usize,

    /// Messages larger than this are released back to the pool eagerly
    /// rather than held for reuse, to avoid pinning oversized buffers.
    pub large_message_release_threshold: usize,

    /// Size of the read-side buffer used when reassembling stream frames.
    pub read_buffer_size: usize,

    /// Size of the write-side buffer used when framing outgoing messages.
    pub write_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_secs(1),
            disconnect_threshold: 8,
            heartbeat_check_period: Duration::from_millis(100),
            connect_attempt_timeout: Duration::from_secs(2),
            reliable_send_timeout: Duration::from_secs(10),
            datagram_max: DEFAULT_DATAGRAM_MAX,
            large_message_release_threshold: 8 * 1024,
            read_buffer_size: 8 * 1024,
            write_buffer_size: 8 * 1024,
        }
    }
}

impl NetworkConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    #[must_use]
    pub const fn with_disconnect_threshold(mut self, threshold: u32) -> Self {
        self.disconnect_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_heartbeat_check_period(mut self, period: Duration) -> Self {
        self.heartbeat_check_period = period;
        self
    }

    #[must_use]
    pub const fn with_connect_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.connect_attempt_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_reliable_send_timeout(mut self, timeout: Duration) -> Self {
        self.reliable_send_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_datagram_max(mut self, max: usize) -> Self {
        self.datagram_max = max;
        self
    }

    #[must_use]
    pub const fn with_large_message_release_threshold(mut self, threshold: usize) -> Self {
        self.large_message_release_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// The disconnect window derived from `heartbeat_period * disconnect_threshold`.
    #[must_use]
    pub fn disconnect_window(&self) -> Duration {
        self.heartbeat_period * self.disconnect_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = NetworkConfig::default();
        assert_eq!(cfg.heartbeat_period, Duration::from_secs(1));
        assert_eq!(cfg.disconnect_threshold, 8);
        assert_eq!(cfg.disconnect_window(), Duration::from_secs(8));
        assert_eq!(cfg.datagram_max, 65_507 - 24);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = NetworkConfig::new().with_connect_attempt_timeout(Duration::from_millis(500));
        assert_eq!(cfg.connect_attempt_timeout, Duration::from_millis(500));
    }
}
