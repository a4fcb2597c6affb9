//! Catchup buffer for late-joiner support
//!
//! A listener that connects to an already-running relay should start hearing
//! audio immediately rather than waiting for the next upstream read. The
//! catchup buffer keeps a bounded rolling window of the most recently
//! published chunks; a new session replays the snapshot before switching to
//! live delivery.

use std::collections::VecDeque;

use bytes::Bytes;

/// Bounded rolling buffer of recent audio chunks
///
/// Oldest chunks are evicted once the byte bound is exceeded, so memory per
/// stream stays bounded no matter how long the producer runs.
#[derive(Debug)]
pub struct CatchupBuffer {
    /// Maximum retained size in bytes
    max_bytes: usize,
    /// Current retained size in bytes
    current_bytes: usize,
    /// Retained chunks, oldest first
    chunks: VecDeque<Bytes>,
}

impl CatchupBuffer {
    /// Create a buffer with the given byte bound
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            current_bytes: 0,
            chunks: VecDeque::new(),
        }
    }

    /// Append a chunk, evicting oldest chunks past the byte bound
    ///
    /// A chunk larger than the whole bound is not retained at all.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }

        while self.current_bytes + chunk.len() > self.max_bytes {
            match self.chunks.pop_front() {
                Some(old) => self.current_bytes -= old.len(),
                None => return, // single chunk exceeds the bound
            }
        }

        self.current_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Snapshot of the retained chunks, oldest first
    ///
    /// `Bytes` is reference counted, so this clones handles, not payloads.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.chunks.iter().cloned().collect()
    }

    /// Number of retained chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Retained size in bytes
    pub fn size(&self) -> usize {
        self.current_bytes
    }

    /// Drop all retained chunks
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.current_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_snapshot() {
        let mut buf = CatchupBuffer::with_max_bytes(1024);

        buf.push(Bytes::from_static(b"abc"));
        buf.push(Bytes::from_static(b"def"));

        assert_eq!(buf.chunk_count(), 2);
        assert_eq!(buf.size(), 6);

        let snap = buf.snapshot();
        assert_eq!(snap[0].as_ref(), b"abc");
        assert_eq!(snap[1].as_ref(), b"def");
    }

    #[test]
    fn test_evicts_oldest() {
        let mut buf = CatchupBuffer::with_max_bytes(10);

        buf.push(Bytes::from(vec![1u8; 4]));
        buf.push(Bytes::from(vec![2u8; 4]));
        buf.push(Bytes::from(vec![3u8; 4]));

        // First chunk evicted to stay under 10 bytes
        assert_eq!(buf.size(), 8);
        let snap = buf.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0][0], 2);
        assert_eq!(snap[1][0], 3);
    }

    #[test]
    fn test_oversized_chunk_not_retained() {
        let mut buf = CatchupBuffer::with_max_bytes(4);

        buf.push(Bytes::from(vec![1u8; 2]));
        buf.push(Bytes::from(vec![2u8; 8]));

        assert_eq!(buf.chunk_count(), 0);
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_ignores_empty_chunks() {
        let mut buf = CatchupBuffer::with_max_bytes(16);

        buf.push(Bytes::new());
        assert_eq!(buf.chunk_count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut buf = CatchupBuffer::with_max_bytes(16);

        buf.push(Bytes::from_static(b"data"));
        buf.clear();

        assert_eq!(buf.chunk_count(), 0);
        assert_eq!(buf.size(), 0);
    }
}
