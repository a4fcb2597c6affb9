//! Live audio relay core
//!
//! The relay turns one upstream audio stream into many client streams. Each
//! registered id gets exactly one `RelayBuffer` with one background producer
//! task fetching from the upstream URL; any number of consumer sessions
//! subscribe to the buffer and are fed by `tokio::sync::broadcast` fan-out.
//!
//! # Architecture
//!
//! ```text
//!                           Arc<RelayManager>
//!                      ┌──────────────────────────┐
//!                      │ buffers: HashMap<id,     │
//!                      │   RelayEntry {           │
//!                      │     buffer, cancel,      │
//!                      │     producer task,       │
//!                      │   }                      │
//!                      │ >                        │
//!                      └────────────┬─────────────┘
//!                                   │
//!        ┌──────────────────────────┼──────────────────────────┐
//!        │                          │                          │
//!        ▼                          ▼                          ▼
//!   [Producer]                [Session]                   [Session]
//!   reqwest GET loop          rx.recv()                   rx.recv()
//!        │                          │                          │
//!        └──► buffer.publish() ──► broadcast ──► HTTP response body
//! ```
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`, so the broadcast channel clones a
//! reference-counted handle per subscriber rather than copying the payload.
//! Late joiners are primed from a bounded catchup buffer of recent chunks;
//! slow consumers lag the broadcast channel and lose the oldest chunks
//! instead of growing unbounded queues.

pub mod buffer;
pub mod catchup;
pub mod config;
pub mod manager;
pub(crate) mod producer;

pub use buffer::{ProducerState, RelayBuffer, RelayStats, SessionGuard};
pub use catchup::CatchupBuffer;
pub use config::RelayConfig;
pub use manager::RelayManager;
