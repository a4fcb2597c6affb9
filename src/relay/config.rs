//! Relay configuration

use std::time::Duration;

/// Configuration for relay buffers and their producer tasks
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Size of the chunks published to listeners
    pub chunk_size: usize,

    /// Delay before retrying a failed upstream connection
    pub reconnect_delay: Duration,

    /// Capacity (in chunks) of the per-buffer broadcast channel
    pub broadcast_capacity: usize,

    /// Maximum bytes retained in the catchup buffer for late joiners
    pub catchup_max_bytes: usize,

    /// Capacity (in chunks) of each session's forwarding queue
    pub session_queue: usize,

    /// How long a buffer may sit with zero subscribers before retirement
    pub grace_period: Duration,

    /// Interval between cleanup passes
    pub cleanup_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32 * 1024, // 32KB
            reconnect_delay: Duration::from_secs(5),
            broadcast_capacity: 64,
            catchup_max_bytes: 256 * 1024, // 256KB, a few seconds of audio
            session_queue: 16,
            grace_period: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Set the publish chunk size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the upstream reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the broadcast channel capacity
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the catchup buffer byte bound
    pub fn catchup_max_bytes(mut self, max: usize) -> Self {
        self.catchup_max_bytes = max;
        self
    }

    /// Set the per-session forwarding queue capacity
    pub fn session_queue(mut self, capacity: usize) -> Self {
        self.session_queue = capacity.max(1);
        self
    }

    /// Set the idle grace period before a buffer is retired
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Set the cleanup pass interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.chunk_size, 32 * 1024);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.broadcast_capacity, 64);
        assert_eq!(config.catchup_max_bytes, 256 * 1024);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .chunk_size(4096)
            .reconnect_delay(Duration::from_millis(100))
            .broadcast_capacity(8)
            .catchup_max_bytes(64 * 1024)
            .session_queue(4)
            .grace_period(Duration::from_secs(5))
            .cleanup_interval(Duration::from_secs(1));

        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.reconnect_delay, Duration::from_millis(100));
        assert_eq!(config.broadcast_capacity, 8);
        assert_eq!(config.catchup_max_bytes, 64 * 1024);
        assert_eq!(config.session_queue, 4);
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.cleanup_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_builder_floors() {
        // Zero sizes would stall the producer or panic broadcast::channel
        let config = RelayConfig::default()
            .chunk_size(0)
            .broadcast_capacity(0)
            .session_queue(0);

        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.broadcast_capacity, 1);
        assert_eq!(config.session_queue, 1);
    }
}
