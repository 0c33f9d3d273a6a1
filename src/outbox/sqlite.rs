use std::sync::Arc;

use rusqlite::{params, params_from_iter, Row};

use crate::clock::{Clock, SystemClock};
use crate::db::{decode_time, encode_time, DbResult, SqliteDatabase};

use super::message::{MessageId, NewOutboxMessage, OutboxMessage, TopicBacklog};
use super::store::OutboxStore;

/// Outbox rows in the `outbox_messages` table.
#[derive(Clone)]
pub struct SqliteOutboxStore {
    db: SqliteDatabase,
    clock: Arc<dyn Clock>,
}

impl SqliteOutboxStore {
    pub fn new(db: SqliteDatabase) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: SqliteDatabase, clock: Arc<dyn Clock>) -> Self {
        SqliteOutboxStore { db, clock }
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }
}

fn read_message(row: &Row<'_>) -> rusqlite::Result<(OutboxMessage, String)> {
    Ok((
        OutboxMessage {
            id: row.get(0)?,
            topic: row.get(1)?,
            key: row.get(2)?,
            partition_key: row.get(3)?,
            payload: row.get(4)?,
            created_at: Default::default(),
        },
        row.get(5)?,
    ))
}

impl OutboxStore for SqliteOutboxStore {
    fn enqueue(&self, message: NewOutboxMessage) -> DbResult<OutboxMessage> {
        let created_at = self.clock.now();
        let partition_key = message.resolved_partition_key();
        let id = self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO outbox_messages (topic, key, partition_key, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.topic,
                    message.key,
                    partition_key,
                    message.payload,
                    encode_time(created_at),
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })?;

        Ok(OutboxMessage {
            id,
            topic: message.topic,
            key: message.key,
            partition_key,
            payload: message.payload,
            created_at,
        })
    }

    fn pending_topics(&self) -> DbResult<Vec<String>> {
        self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT DISTINCT topic FROM outbox_messages ORDER BY topic")?;
            let topics = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(topics)
        })
    }

    fn fetch_batch(&self, topic: &str, limit: usize) -> DbResult<Vec<OutboxMessage>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, topic, key, partition_key, message, created_at
                 FROM outbox_messages
                 WHERE topic = ?1
                 ORDER BY id ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![topic, limit as i64], read_message)?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(mut message, created_at)| {
                    message.created_at = decode_time(&created_at)?;
                    Ok(message)
                })
                .collect()
        })
    }

    fn delete(&self, ids: &[MessageId]) -> DbResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM outbox_messages WHERE id IN ({placeholders})");
        self.db
            .transaction(|tx| Ok(tx.execute(&sql, params_from_iter(ids.iter()))?))
    }

    fn pending_summary(&self) -> DbResult<Vec<TopicBacklog>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT topic, COUNT(*), MIN(created_at)
                 FROM outbox_messages
                 GROUP BY topic
                 ORDER BY topic",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(topic, pending, oldest)| {
                    Ok(TopicBacklog {
                        topic,
                        pending: pending as u64,
                        oldest_created_at: decode_time(&oldest)?,
                    })
                })
                .collect()
        })
    }

    fn revalidate(&self) -> DbResult<()> {
        self.db.revalidate()
    }
}
