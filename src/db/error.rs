//! Database error types.

use thiserror::Error;

use crate::transaction::patterns;

/// Error returned by outbox stores and topic coordinators.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No pooled connection could be checked out.
    #[cfg(feature = "sqlite")]
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A shared in-process lock was poisoned by a panicking thread.
    #[error("store lock poisoned during {0}")]
    Poisoned(&'static str),

    /// Error reported by some other backend, carried as its message.
    #[error("database error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl DbError {
    /// Deadlock or lock-timeout, in any of the recognised SQL dialects.
    pub fn is_deadlock(&self) -> bool {
        patterns::is_deadlock(&self.to_string())
    }

    /// Lock-wait or dropped-connection errors that are worth retrying in place.
    pub fn is_transient(&self) -> bool {
        patterns::is_transient(&self.to_string())
    }
}

/// Result type alias using DbError.
pub type DbResult<T> = Result<T, DbError>;
