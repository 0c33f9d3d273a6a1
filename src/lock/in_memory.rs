use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::db::{DbError, DbResult};

use super::coordinator::TopicCoordinator;
use super::topic_lock::{LockConfig, TopicLock};

/// In-process topic coordinator.
///
/// Each operation holds the table's write lock for its whole read-modify-write,
/// which gives the same atomicity as the conditional `UPDATE` of the SQLite
/// coordinator. Cloning shares the table.
#[derive(Clone)]
pub struct InMemoryTopicCoordinator {
    rows: Arc<RwLock<BTreeMap<String, TopicLock>>>,
    config: LockConfig,
    clock: Arc<dyn Clock>,
}

impl InMemoryTopicCoordinator {
    pub fn new(config: LockConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LockConfig, clock: Arc<dyn Clock>) -> Self {
        InMemoryTopicCoordinator {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            config,
            clock,
        }
    }

    /// The lock row for `topic`, if one was ever created.
    pub fn get(&self, topic: &str) -> DbResult<Option<TopicLock>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned("read"))?;
        Ok(rows.get(topic).cloned())
    }

    fn update_owned<F>(&self, topic: &str, worker_id: &str, apply: F) -> DbResult<bool>
    where
        F: FnOnce(&mut TopicLock),
    {
        let mut rows = self.rows.write().map_err(|_| DbError::Poisoned("write"))?;
        match rows.get_mut(topic) {
            Some(row) if row.is_owned_by(worker_id) => {
                apply(row);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Default for InMemoryTopicCoordinator {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

impl TopicCoordinator for InMemoryTopicCoordinator {
    fn lock(&self, topic: &str, worker_id: &str) -> DbResult<bool> {
        let now = self.clock.now();
        let mut rows = self.rows.write().map_err(|_| DbError::Poisoned("write"))?;
        let row = rows
            .entry(topic.to_string())
            .or_insert_with(|| TopicLock::new(topic));

        if row.is_claimable(now, &self.config) {
            row.locked_by = Some(worker_id.to_string());
            row.locked_at = Some(now);
            row.error = false;
        }
        Ok(row.is_owned_by(worker_id))
    }

    fn heartbeat(&self, topic: &str, worker_id: &str) -> DbResult<bool> {
        let now = self.clock.now();
        self.update_owned(topic, worker_id, |row| row.locked_at = Some(now))
    }

    fn clear_lock(&self, topic: &str, worker_id: &str) -> DbResult<()> {
        let now = self.clock.now();
        self.update_owned(topic, worker_id, |row| {
            row.locked_by = None;
            row.locked_at = None;
            row.error = false;
            row.retries = 0;
            row.last_processed_at = Some(now);
        })?;
        Ok(())
    }

    fn register_error(&self, topic: &str, worker_id: &str) -> DbResult<()> {
        let now = self.clock.now();
        self.update_owned(topic, worker_id, |row| {
            row.locked_by = None;
            row.locked_at = Some(now);
            row.error = true;
            row.retries += 1;
        })?;
        Ok(())
    }

    fn ping_empty_topics(&self, exclude: &[String]) -> DbResult<usize> {
        let now = self.clock.now();
        let mut rows = self.rows.write().map_err(|_| DbError::Poisoned("write"))?;
        let mut touched = 0;
        for row in rows.values_mut() {
            let idle = row.locked_by.is_none() && !row.error;
            if idle && !exclude.contains(&row.topic) {
                row.last_processed_at = Some(now);
                touched += 1;
            }
        }
        Ok(touched)
    }

    fn topic_locks(&self) -> DbResult<Vec<TopicLock>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned("read"))?;
        Ok(rows.values().cloned().collect())
    }

    fn lock_config(&self) -> &LockConfig {
        &self.config
    }
}
