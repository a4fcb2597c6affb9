//! Relay manager
//!
//! The manager guarantees at most one relay buffer (and therefore one
//! upstream connection) per stream id, no matter how many clients ask for it
//! concurrently, and retires buffers nobody is listening to anymore.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::buffer::{RelayBuffer, RelayStats};
use super::config::RelayConfig;
use super::producer;

/// A buffer plus the handle of its producer task
struct RelayEntry {
    buffer: Arc<RelayBuffer>,
    producer: JoinHandle<()>,
}

/// Owner of all active relay buffers
///
/// Thread-safe via `RwLock`; the write lock is held only for create, retire
/// and cleanup. The manager owns the shared upstream HTTP client, which
/// producers clone per connection attempt.
pub struct RelayManager {
    buffers: RwLock<HashMap<String, RelayEntry>>,
    client: reqwest::Client,
    config: RelayConfig,
}

impl RelayManager {
    /// Create a manager with the given configuration and upstream client
    pub fn new(config: RelayConfig, client: reqwest::Client) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            client,
            config,
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Return the buffer for `id`, creating it (and starting its producer)
    /// if absent
    ///
    /// The producer is spawned before the map lock is released, so two
    /// concurrent calls for a new id can never start two upstream fetches.
    pub async fn get_or_create(&self, id: &str, url: &str) -> Arc<RelayBuffer> {
        let mut buffers = self.buffers.write().await;

        if let Some(entry) = buffers.get(id) {
            return Arc::clone(&entry.buffer);
        }

        let buffer = Arc::new(RelayBuffer::new(id, url, &self.config));

        let producer = tokio::spawn(producer::run(
            Arc::clone(&buffer),
            self.client.clone(),
            self.config.clone(),
            buffer.shutdown_token(),
        ));

        tracing::info!(stream = %id, url = %url, "Relay buffer created");

        buffers.insert(
            id.to_string(),
            RelayEntry {
                buffer: Arc::clone(&buffer),
                producer,
            },
        );

        buffer
    }

    /// Return the buffer for `id` if one exists
    pub async fn get(&self, id: &str) -> Option<Arc<RelayBuffer>> {
        let buffers = self.buffers.read().await;
        buffers.get(id).map(|entry| Arc::clone(&entry.buffer))
    }

    /// Stop the producer for `id` and drop the buffer
    ///
    /// Returns `true` if a buffer was retired. The retirement signal also
    /// ends every live consumer session, so their clients see end-of-stream
    /// rather than indefinite silence.
    pub async fn retire(&self, id: &str) -> bool {
        let entry = {
            let mut buffers = self.buffers.write().await;
            buffers.remove(id)
        };

        match entry {
            Some(entry) => {
                entry.buffer.retire();
                tracing::info!(
                    stream = %id,
                    subscribers = entry.buffer.subscriber_count(),
                    "Relay buffer retired"
                );
                // The producer observes the token at its next suspension
                // point; the handle is left to finish on its own.
                drop(entry.producer);
                true
            }
            None => false,
        }
    }

    /// Number of active buffers
    pub async fn buffer_count(&self) -> usize {
        self.buffers.read().await.len()
    }

    /// Statistics for the buffer for `id`, if one exists
    pub async fn stats(&self, id: &str) -> Option<RelayStats> {
        let buffer = self.get(id).await?;
        Some(buffer.stats().await)
    }

    /// Run one cleanup pass
    ///
    /// Retires every buffer whose subscriber count has been zero for longer
    /// than the configured grace period.
    pub async fn cleanup(&self) {
        let expired: Vec<String> = {
            let buffers = self.buffers.read().await;
            buffers
                .iter()
                .filter_map(|(id, entry)| {
                    entry
                        .buffer
                        .idle_for()
                        .filter(|idle| *idle > self.config.grace_period)
                        .map(|_| id.clone())
                })
                .collect()
        };

        for id in expired {
            // A subscriber may have arrived between the scan and here, so
            // check again before retiring. One that slips in after the
            // recheck gets end-of-stream from the retirement signal.
            let still_idle = self
                .get(&id)
                .await
                .and_then(|b| b.idle_for())
                .map(|idle| idle > self.config.grace_period)
                .unwrap_or(false);

            if still_idle && self.retire(&id).await {
                tracing::info!(stream = %id, "Idle buffer removed by cleanup");
            }
        }
    }

    /// Spawn the periodic cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = manager.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.cleanup().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    // Producers pointed here fail to connect and just retry; the tests only
    // exercise manager bookkeeping.
    const DEAD_URL: &str = "http://127.0.0.1:9/stream";

    fn manager(config: RelayConfig) -> Arc<RelayManager> {
        Arc::new(RelayManager::new(config, reqwest::Client::new()))
    }

    #[tokio::test]
    async fn test_get_or_create_deduplicates() {
        let manager = manager(RelayConfig::default());

        let a = manager.get_or_create("abc", DEAD_URL).await;
        let b = manager.get_or_create("abc", DEAD_URL).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.buffer_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let manager = manager(RelayConfig::default());
        assert!(manager.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_retire_removes_buffer() {
        let manager = manager(RelayConfig::default());

        manager.get_or_create("abc", DEAD_URL).await;
        assert!(manager.retire("abc").await);

        assert!(manager.get("abc").await.is_none());
        assert_eq!(manager.buffer_count().await, 0);

        // Retiring twice is a no-op
        assert!(!manager.retire("abc").await);
    }

    #[tokio::test]
    async fn test_retire_signals_live_sessions() {
        let manager = manager(RelayConfig::default());

        let buffer = manager.get_or_create("abc", DEAD_URL).await;
        let (_rx, _catchup, _guard) = buffer.subscribe().await;

        assert!(manager.retire("abc").await);
        assert!(buffer.is_retired());

        // Sessions select on this token; it must fire even while their
        // guards keep the buffer (and its broadcast sender) alive
        tokio::time::timeout(
            Duration::from_millis(100),
            buffer.shutdown_token().cancelled(),
        )
        .await
        .expect("retirement signal not observed");
    }

    #[tokio::test]
    async fn test_cleanup_retires_idle_buffers() {
        let config = RelayConfig::default().grace_period(Duration::from_millis(20));
        let manager = manager(config);

        manager.get_or_create("abc", DEAD_URL).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        manager.cleanup().await;
        assert_eq!(manager.buffer_count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_subscribed_buffers() {
        let config = RelayConfig::default().grace_period(Duration::from_millis(20));
        let manager = manager(config);

        let buffer = manager.get_or_create("abc", DEAD_URL).await;
        let (_rx, _catchup, _guard) = buffer.subscribe().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.cleanup().await;

        assert_eq!(manager.buffer_count().await, 1);
    }

    #[tokio::test]
    async fn test_idle_clock_restarts_after_last_unsubscribe() {
        let config = RelayConfig::default().grace_period(Duration::from_millis(40));
        let manager = manager(config);

        let buffer = manager.get_or_create("abc", DEAD_URL).await;
        let (_rx, _catchup, guard) = buffer.subscribe().await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(guard);

        // Grace period restarts from the disconnect, not from creation
        manager.cleanup().await;
        assert_eq!(manager.buffer_count().await, 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.cleanup().await;
        assert_eq!(manager.buffer_count().await, 0);
    }
}
