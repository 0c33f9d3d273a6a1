use std::sync::Arc;

use rusqlite::{params, params_from_iter, OptionalExtension};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::db::{decode_time, encode_time, DbResult, SqliteDatabase};

use super::coordinator::TopicCoordinator;
use super::topic_lock::{LockConfig, TopicLock};

/// Topic coordinator backed by the `topic_locks` table.
///
/// Any number of processes may share the database file; ownership is decided
/// by conditional `UPDATE`s only.
#[derive(Clone)]
pub struct SqliteTopicCoordinator {
    db: SqliteDatabase,
    config: LockConfig,
    clock: Arc<dyn Clock>,
}

impl SqliteTopicCoordinator {
    pub fn new(db: SqliteDatabase, config: LockConfig) -> Self {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    pub fn with_clock(db: SqliteDatabase, config: LockConfig, clock: Arc<dyn Clock>) -> Self {
        SqliteTopicCoordinator { db, config, clock }
    }

    /// The lock row for `topic`, if one was ever created.
    pub fn get(&self, topic: &str) -> DbResult<Option<TopicLock>> {
        Ok(self
            .topic_locks()?
            .into_iter()
            .find(|row| row.topic == topic))
    }
}

type RawLock = (
    String,
    Option<String>,
    Option<String>,
    bool,
    i64,
    Option<String>,
);

fn decode_lock(raw: RawLock) -> DbResult<TopicLock> {
    let (topic, locked_by, locked_at, error, retries, last_processed_at) = raw;
    Ok(TopicLock {
        topic,
        locked_by,
        locked_at: locked_at.as_deref().map(decode_time).transpose()?,
        error,
        retries,
        last_processed_at: last_processed_at.as_deref().map(decode_time).transpose()?,
    })
}

impl TopicCoordinator for SqliteTopicCoordinator {
    fn lock(&self, topic: &str, worker_id: &str) -> DbResult<bool> {
        let now = self.clock.now();
        let stale_before = encode_time(self.config.stale_before(now));
        let quarantined_after = encode_time(self.config.quarantined_after(now));

        self.db.transaction(|tx| {
            // A concurrent creator may win the insert; either row is fine.
            tx.execute(
                "INSERT INTO topic_locks (topic, locked_by, locked_at, error, retries)
                 VALUES (?1, NULL, NULL, 0, 0)
                 ON CONFLICT (topic) DO NOTHING",
                params![topic],
            )?;
            tx.execute(
                "UPDATE topic_locks
                 SET locked_by = ?2, locked_at = ?3, error = 0
                 WHERE topic = ?1
                   AND ((locked_by IS NULL AND error = 0)
                     OR (error = 0 AND locked_at < ?4)
                     OR (error = 1 AND (locked_at IS NULL OR locked_at < ?5)))",
                params![topic, worker_id, encode_time(now), stale_before, quarantined_after],
            )?;
            let owner: Option<String> = tx
                .query_row(
                    "SELECT locked_by FROM topic_locks WHERE topic = ?1",
                    params![topic],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            Ok(owner.as_deref() == Some(worker_id))
        })
    }

    fn heartbeat(&self, topic: &str, worker_id: &str) -> DbResult<bool> {
        let now = encode_time(self.clock.now());
        let updated = self.db.transaction(|tx| {
            Ok(tx.execute(
                "UPDATE topic_locks SET locked_at = ?3 WHERE topic = ?1 AND locked_by = ?2",
                params![topic, worker_id, now],
            )?)
        })?;
        Ok(updated > 0)
    }

    fn clear_lock(&self, topic: &str, worker_id: &str) -> DbResult<()> {
        let now = encode_time(self.clock.now());
        self.db.transaction(|tx| {
            tx.execute(
                "UPDATE topic_locks
                 SET locked_by = NULL, locked_at = NULL, error = 0, retries = 0,
                     last_processed_at = ?3
                 WHERE topic = ?1 AND locked_by = ?2",
                params![topic, worker_id, now],
            )?;
            Ok(())
        })
    }

    fn register_error(&self, topic: &str, worker_id: &str) -> DbResult<()> {
        let now = encode_time(self.clock.now());
        self.db.transaction(|tx| {
            tx.execute(
                "UPDATE topic_locks
                 SET locked_by = NULL, locked_at = ?3, error = 1, retries = retries + 1
                 WHERE topic = ?1 AND locked_by = ?2",
                params![topic, worker_id, now],
            )?;
            Ok(())
        })
    }

    fn ping_empty_topics(&self, exclude: &[String]) -> DbResult<usize> {
        let now = encode_time(self.clock.now());
        let mut sql = String::from(
            "UPDATE topic_locks SET last_processed_at = ?
             WHERE locked_by IS NULL AND error = 0",
        );
        if !exclude.is_empty() {
            let placeholders = vec!["?"; exclude.len()].join(", ");
            sql.push_str(&format!(" AND topic NOT IN ({placeholders})"));
        }
        let values = std::iter::once(now.as_str()).chain(exclude.iter().map(String::as_str));

        let touched = self
            .db
            .transaction(|tx| Ok(tx.execute(&sql, params_from_iter(values.clone()))?))?;
        debug!(touched, excluded = exclude.len(), "Pinged empty topics");
        Ok(touched)
    }

    fn topic_locks(&self) -> DbResult<Vec<TopicLock>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT topic, locked_by, locked_at, error, retries, last_processed_at
                 FROM topic_locks ORDER BY topic",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<Result<Vec<RawLock>, _>>()?;
            rows.into_iter().map(decode_lock).collect()
        })
    }

    fn lock_config(&self) -> &LockConfig {
        &self.config
    }
}
