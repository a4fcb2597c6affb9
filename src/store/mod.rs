//! Persistent stream store
//!
//! The store keeps the id → upstream URL mapping and the per-session
//! connection audit log. It is a thin collaborator of the relay core: the
//! core only ever looks ids up and appends connection records.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;

/// A registered stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Short stream id
    pub id: String,
    /// Upstream source URL
    pub url: String,
    /// Registration timestamp (sqlite `CURRENT_TIMESTAMP`)
    pub created_at: String,
}

/// Trait for persistent stream stores
///
/// Methods are synchronous; async callers run them on the blocking pool via
/// `tokio::task::spawn_blocking`.
pub trait StreamStore: Send + Sync {
    /// Create the schema. Idempotent.
    fn init(&self) -> Result<()>;

    /// Register a new stream. Fails if `id` already exists.
    fn insert_stream(&self, id: &str, url: &str) -> Result<()>;

    /// Look up a registered stream by id.
    fn lookup(&self, id: &str) -> Result<Option<StreamRecord>>;

    /// Append a connection record for a consumer session.
    fn record_connection(&self, stream_id: &str, ip: &str, user_agent: &str) -> Result<()>;
}
