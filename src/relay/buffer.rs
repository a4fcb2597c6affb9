//! Per-source relay buffer
//!
//! This module defines the per-stream state shared between one producer task
//! and any number of consumer sessions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use super::catchup::CatchupBuffer;
use super::config::RelayConfig;

/// Observable state of a buffer's producer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Producer is trying to reach the upstream source
    Connecting,
    /// Producer is reading the upstream body and publishing chunks
    Streaming,
}

/// Entry for a single relayed stream
///
/// Holds the broadcast sender for fan-out, the catchup buffer for late
/// joiners, and the bookkeeping the manager needs for retirement. Payload
/// chunks are `Bytes`, so fan-out to N sessions reference-counts one
/// allocation instead of copying it N times.
pub struct RelayBuffer {
    /// Registered stream id
    id: String,

    /// Upstream source URL
    url: String,

    /// Broadcast sender for fan-out to sessions
    tx: broadcast::Sender<Bytes>,

    /// Recent chunks replayed to new sessions.
    ///
    /// The lock also serializes `publish` against `subscribe` so a new
    /// session sees every chunk exactly once: either in the snapshot or on
    /// its receiver, never both and never neither.
    catchup: Mutex<CatchupBuffer>,

    /// Number of live consumer sessions
    subscriber_count: AtomicU32,

    /// Producer state, updated by the fetch loop
    state: StdMutex<ProducerState>,

    /// When the subscriber count last dropped to zero.
    ///
    /// Set at creation so a buffer nobody ever subscribes to is still
    /// reclaimed by the cleanup task.
    idle_since: StdMutex<Option<Instant>>,

    /// Cancelled when the buffer is retired.
    ///
    /// Both the producer loop and every consumer session select on this
    /// token; sessions hold an `Arc` to the buffer through their guard, so
    /// waiting for the broadcast sender to drop would never complete.
    shutdown: CancellationToken,

    /// When the buffer was created
    created_at: Instant,
}

impl RelayBuffer {
    /// Create a new buffer for `id` relaying from `url`
    pub(crate) fn new(id: impl Into<String>, url: impl Into<String>, config: &RelayConfig) -> Self {
        let (tx, _) = broadcast::channel(config.broadcast_capacity);

        Self {
            id: id.into(),
            url: url.into(),
            tx,
            catchup: Mutex::new(CatchupBuffer::with_max_bytes(config.catchup_max_bytes)),
            subscriber_count: AtomicU32::new(0),
            state: StdMutex::new(ProducerState::Connecting),
            idle_since: StdMutex::new(Some(Instant::now())),
            shutdown: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    /// Clone of the token cancelled on retirement
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal retirement to the producer and all live sessions
    pub(crate) fn retire(&self) {
        self.shutdown.cancel();
    }

    /// Whether the buffer has been retired
    pub fn is_retired(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Registered stream id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Upstream source URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Publish a chunk to all sessions and record it for late joiners
    ///
    /// Returns the number of receivers the chunk was delivered to.
    pub(crate) async fn publish(&self, chunk: Bytes) -> usize {
        let mut catchup = self.catchup.lock().await;
        catchup.push(chunk.clone());
        self.tx.send(chunk).unwrap_or(0)
    }

    /// Subscribe a new consumer session
    ///
    /// Returns the live receiver, the catchup snapshot to replay first, and a
    /// guard that decrements the subscriber count when the session ends.
    pub async fn subscribe(self: &Arc<Self>) -> (broadcast::Receiver<Bytes>, Vec<Bytes>, SessionGuard) {
        let catchup = self.catchup.lock().await;
        let rx = self.tx.subscribe();
        let snapshot = catchup.snapshot();
        drop(catchup);

        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut idle) = self.idle_since.lock() {
            *idle = None;
        }

        tracing::info!(
            stream = %self.id,
            subscribers = self.subscriber_count(),
            catchup_chunks = snapshot.len(),
            "Subscriber added"
        );

        (rx, snapshot, SessionGuard { buffer: Arc::clone(self) })
    }

    /// Number of live consumer sessions
    pub fn subscriber_count(&self) -> u32 {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Current producer state
    pub fn state(&self) -> ProducerState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ProducerState::Connecting)
    }

    pub(crate) fn set_state(&self, state: ProducerState) {
        if let Ok(mut s) = self.state.lock() {
            *s = state;
        }
    }

    /// How long the buffer has had zero subscribers, if it currently does
    pub(crate) fn idle_for(&self) -> Option<Duration> {
        self.idle_since
            .lock()
            .ok()
            .and_then(|idle| idle.map(|t| t.elapsed()))
    }

    /// Age of the buffer
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Statistics snapshot for this buffer
    pub async fn stats(&self) -> RelayStats {
        let catchup = self.catchup.lock().await;
        RelayStats {
            subscriber_count: self.subscriber_count(),
            state: self.state(),
            catchup_chunks: catchup.chunk_count(),
            catchup_bytes: catchup.size(),
        }
    }
}

/// RAII guard for one consumer session's subscription
///
/// Dropping the guard (session task exit, whatever the reason) decrements the
/// subscriber count and starts the idle clock when the count reaches zero.
pub struct SessionGuard {
    buffer: Arc<RelayBuffer>,
}

impl SessionGuard {
    /// The buffer this session is subscribed to
    pub fn buffer(&self) -> &RelayBuffer {
        &self.buffer
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let prev = self.buffer.subscriber_count.fetch_sub(1, Ordering::Relaxed);

        if prev <= 1 {
            if let Ok(mut idle) = self.buffer.idle_since.lock() {
                *idle = Some(Instant::now());
            }
        }

        tracing::debug!(
            stream = %self.buffer.id,
            subscribers = prev.saturating_sub(1),
            "Subscriber removed"
        );
    }
}

/// Statistics for a relayed stream
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Number of live consumer sessions
    pub subscriber_count: u32,
    /// Producer state
    pub state: ProducerState,
    /// Chunks retained for late joiners
    pub catchup_chunks: usize,
    /// Bytes retained for late joiners
    pub catchup_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> Arc<RelayBuffer> {
        Arc::new(RelayBuffer::new(
            "abc123",
            "http://127.0.0.1:9/stream",
            &RelayConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let buf = buffer();

        let (mut rx1, catchup1, _g1) = buf.subscribe().await;
        let (mut rx2, catchup2, _g2) = buf.subscribe().await;
        assert!(catchup1.is_empty());
        assert!(catchup2.is_empty());

        let delivered = buf.publish(Bytes::from_static(b"chunk")).await;
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await.unwrap().as_ref(), b"chunk");
        assert_eq!(rx2.recv().await.unwrap().as_ref(), b"chunk");
    }

    #[tokio::test]
    async fn test_late_joiner_gets_catchup() {
        let buf = buffer();

        buf.publish(Bytes::from_static(b"one")).await;
        buf.publish(Bytes::from_static(b"two")).await;

        let (_rx, catchup, _guard) = buf.subscribe().await;
        assert_eq!(catchup.len(), 2);
        assert_eq!(catchup[0].as_ref(), b"one");
        assert_eq!(catchup[1].as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_guard_tracks_subscriber_count() {
        let buf = buffer();
        assert_eq!(buf.subscriber_count(), 0);
        assert!(buf.idle_for().is_some());

        let (_rx, _catchup, guard) = buf.subscribe().await;
        assert_eq!(buf.subscriber_count(), 1);
        assert!(buf.idle_for().is_none());

        drop(guard);
        assert_eq!(buf.subscriber_count(), 0);
        assert!(buf.idle_for().is_some());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let buf = buffer();

        let delivered = buf.publish(Bytes::from_static(b"quiet")).await;
        assert_eq!(delivered, 0);

        // Still retained for the next joiner
        let stats = buf.stats().await;
        assert_eq!(stats.catchup_chunks, 1);
        assert_eq!(stats.catchup_bytes, 5);
    }
}
