//! SQL schema for the stream store

/// Registered streams: short id to upstream URL
pub const STREAMS_SQL: &str = "
CREATE TABLE IF NOT EXISTS streams (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
";

/// Connection audit log, one row per consumer session
pub const CONNECTIONS_SQL: &str = "
CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stream_id TEXT,
    ip TEXT,
    user_agent TEXT,
    connected_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
";

pub const INSERT_STREAM_SQL: &str = "INSERT INTO streams (id, url) VALUES (?1, ?2)";

pub const LOOKUP_STREAM_SQL: &str = "SELECT id, url, created_at FROM streams WHERE id = ?1";

pub const INSERT_CONNECTION_SQL: &str =
    "INSERT INTO connections (stream_id, ip, user_agent) VALUES (?1, ?2, ?3)";
