//! `SQLite` stream store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::store::schema::{
    CONNECTIONS_SQL, INSERT_CONNECTION_SQL, INSERT_STREAM_SQL, LOOKUP_STREAM_SQL, STREAMS_SQL,
};
use crate::store::{StreamRecord, StreamStore};

/// SQLite-backed stream store
///
/// A single connection guarded by a mutex; every query is short and indexed,
/// so contention is negligible next to the network work around it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Database file path (None for in-memory)
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL lets connection-log inserts proceed alongside lookups
        let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Create an in-memory store, useful for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file path (None for in-memory)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-query;
        // the connection itself is still usable.
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of recorded connections for a stream
    pub fn connection_count(&self, stream_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM connections WHERE stream_id = ?1",
            params![stream_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl StreamStore for SqliteStore {
    fn init(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute(STREAMS_SQL, [])?;
        conn.execute(CONNECTIONS_SQL, [])?;
        Ok(())
    }

    fn insert_stream(&self, id: &str, url: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(INSERT_STREAM_SQL, params![id, url])?;
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<Option<StreamRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(LOOKUP_STREAM_SQL, params![id], |row| {
                Ok(StreamRecord {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    fn record_connection(&self, stream_id: &str, ip: &str, user_agent: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(INSERT_CONNECTION_SQL, params![stream_id, ip, user_agent])?;
        Ok(())
    }
}
