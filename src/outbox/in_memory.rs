use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::db::{DbError, DbResult};

use super::message::{MessageId, NewOutboxMessage, OutboxMessage, TopicBacklog};
use super::store::OutboxStore;

#[derive(Default)]
struct Rows {
    next_id: MessageId,
    by_id: BTreeMap<MessageId, OutboxMessage>,
}

/// In-memory outbox backed by an ordered map.
///
/// Cloning creates another handle to the same rows, so one instance can be
/// shared between relays running on different threads.
#[derive(Clone)]
pub struct InMemoryOutboxStore {
    rows: Arc<RwLock<Rows>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryOutboxStore {
            rows: Arc::new(RwLock::new(Rows {
                next_id: 1,
                by_id: BTreeMap::new(),
            })),
            clock,
        }
    }

    /// Every pending row, ascending by id.
    pub fn all(&self) -> DbResult<Vec<OutboxMessage>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned("read"))?;
        Ok(rows.by_id.values().cloned().collect())
    }

    pub fn len(&self) -> DbResult<usize> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned("read"))?;
        Ok(rows.by_id.len())
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn enqueue(&self, message: NewOutboxMessage) -> DbResult<OutboxMessage> {
        let mut rows = self.rows.write().map_err(|_| DbError::Poisoned("write"))?;
        let id = rows.next_id;
        rows.next_id += 1;

        let stored = OutboxMessage {
            id,
            partition_key: message.resolved_partition_key(),
            topic: message.topic,
            key: message.key,
            payload: message.payload,
            created_at: self.clock.now(),
        };
        rows.by_id.insert(id, stored.clone());
        Ok(stored)
    }

    fn pending_topics(&self) -> DbResult<Vec<String>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned("read"))?;
        let topics: BTreeSet<&str> = rows.by_id.values().map(|m| m.topic.as_str()).collect();
        Ok(topics.into_iter().map(String::from).collect())
    }

    fn fetch_batch(&self, topic: &str, limit: usize) -> DbResult<Vec<OutboxMessage>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned("read"))?;
        Ok(rows
            .by_id
            .values()
            .filter(|m| m.topic == topic)
            .take(limit)
            .cloned()
            .collect())
    }

    fn delete(&self, ids: &[MessageId]) -> DbResult<usize> {
        let mut rows = self.rows.write().map_err(|_| DbError::Poisoned("write"))?;
        Ok(ids
            .iter()
            .filter(|id| rows.by_id.remove(*id).is_some())
            .count())
    }

    fn pending_summary(&self) -> DbResult<Vec<TopicBacklog>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned("read"))?;
        let mut summary: BTreeMap<&str, TopicBacklog> = BTreeMap::new();
        for message in rows.by_id.values() {
            summary
                .entry(message.topic.as_str())
                .and_modify(|backlog| {
                    backlog.pending += 1;
                    backlog.oldest_created_at = backlog.oldest_created_at.min(message.created_at);
                })
                .or_insert_with(|| TopicBacklog {
                    topic: message.topic.clone(),
                    pending: 1,
                    oldest_created_at: message.created_at,
                });
        }
        Ok(summary.into_values().collect())
    }
}
