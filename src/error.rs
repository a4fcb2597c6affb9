//! Crate error types

use thiserror::Error;

/// Errors produced by the relay server
///
/// Request-level conditions (missing id, missing form field) are mapped to
/// HTTP statuses directly in the handlers and never pass through here.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying sqlite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Upstream fetch failure
    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// I/O failure (listener bind, socket)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
