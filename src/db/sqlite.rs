//! Shared SQLite handle used by the SQLite outbox store and topic coordinator.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use super::{DbError, DbResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS outbox_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    key TEXT,
    partition_key TEXT,
    message BLOB,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS outbox_messages_topic_id ON outbox_messages (topic, id);

CREATE TABLE IF NOT EXISTS topic_locks (
    topic TEXT PRIMARY KEY,
    locked_by TEXT,
    locked_at TEXT,
    error INTEGER NOT NULL DEFAULT 0,
    retries INTEGER NOT NULL DEFAULT 0,
    last_processed_at TEXT
);
";

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
";

/// Connections kept by [`SqliteDatabase::open`].
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// A cloneable handle to a pool of SQLite connections.
///
/// Every store or coordinator call checks out its own connection, so workers in
/// the same process only serialize on SQLite's write lock. Workers in other
/// processes open their own pool on the same file and coordinate through the
/// `topic_locks` table.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: Pool<SqliteConnectionManager>,
    path: Option<PathBuf>,
}

impl SqliteDatabase {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> DbResult<Self> {
        Self::open_with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    /// Like [`open`](Self::open) with at most `max_size` pooled connections.
    pub fn open_with_pool_size(path: &Path, max_size: u32) -> DbResult<Self> {
        let manager =
            SqliteConnectionManager::file(path).with_init(|conn| conn.execute_batch(PRAGMAS));
        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .min_idle(Some(1))
            .test_on_check_out(true)
            .build(manager)?;

        pool.get()?.execute_batch(SCHEMA)?;
        info!(path = %path.display(), max_size, "Outbox database opened");

        Ok(Self {
            pool,
            path: Some(path.to_path_buf()),
        })
    }

    /// A private in-memory database, mostly useful in tests.
    ///
    /// Each in-memory connection is its own database, so the pool holds exactly
    /// one connection and never recycles it.
    pub fn open_in_memory() -> DbResult<Self> {
        let manager =
            SqliteConnectionManager::memory().with_init(|conn| conn.execute_batch(SCHEMA));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        Ok(Self { pool, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check out a connection, waiting for one to be returned if the pool is
    /// exhausted.
    pub fn connection(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run `work` on a pooled connection outside of an explicit transaction.
    pub fn with_connection<T>(&self, work: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let conn = self.connection()?;
        work(&conn)
    }

    /// Run `work` inside an immediate transaction on a pooled connection.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back on any
    /// error, so the whole unit can be retried.
    pub fn transaction<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> DbResult<T>,
    ) -> DbResult<T> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Check out a connection the pool has tested.
    ///
    /// Broken connections are dropped by the pool and replaced on checkout.
    pub fn revalidate(&self) -> DbResult<()> {
        match self.connection() {
            Ok(_) => {
                debug!("Outbox database connection validated");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Outbox database has no usable connection");
                Err(err)
            }
        }
    }

    /// Pooled connections, as `(total, idle)`.
    pub fn pool_state(&self) -> (u32, u32) {
        let state = self.pool.state();
        (state.connections, state.idle_connections)
    }
}

/// Fixed-width UTC timestamps so that text comparison matches time order.
pub(crate) fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::InvalidData(format!("timestamp {raw:?}: {e}")))
}
