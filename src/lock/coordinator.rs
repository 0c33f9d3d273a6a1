use crate::db::DbResult;

use super::topic_lock::{LockConfig, TopicLock};

/// Per-topic ownership shared by every relay worker, in any process.
///
/// Every mutation is a single conditional update on the topic's row, so two
/// workers can never both believe they own a topic while its lock is fresh.
pub trait TopicCoordinator: Send + Sync {
    /// Try to take ownership of `topic`.
    ///
    /// Succeeds when the topic is idle, when its owner stopped heartbeating
    /// for longer than the staleness window, or when its error quarantine has
    /// run out. Returns whether `worker_id` owns the topic afterwards.
    fn lock(&self, topic: &str, worker_id: &str) -> DbResult<bool>;

    /// Refresh the owner's lock timestamp.
    ///
    /// Returns `false` without changing anything when `worker_id` is no
    /// longer the owner.
    fn heartbeat(&self, topic: &str, worker_id: &str) -> DbResult<bool>;

    /// Release a topic after it was drained cleanly.
    fn clear_lock(&self, topic: &str, worker_id: &str) -> DbResult<()>;

    /// Release a topic and quarantine it after a processing error.
    fn register_error(&self, topic: &str, worker_id: &str) -> DbResult<()>;

    /// Touch `last_processed_at` on every idle topic not in `exclude`.
    /// Returns how many rows were touched.
    fn ping_empty_topics(&self, exclude: &[String]) -> DbResult<usize>;

    /// Snapshot of every lock row.
    fn topic_locks(&self) -> DbResult<Vec<TopicLock>>;

    /// The staleness and quarantine windows this coordinator enforces.
    fn lock_config(&self) -> &LockConfig;
}

impl<C: TopicCoordinator + ?Sized> TopicCoordinator for std::sync::Arc<C> {
    fn lock(&self, topic: &str, worker_id: &str) -> DbResult<bool> {
        (**self).lock(topic, worker_id)
    }

    fn heartbeat(&self, topic: &str, worker_id: &str) -> DbResult<bool> {
        (**self).heartbeat(topic, worker_id)
    }

    fn clear_lock(&self, topic: &str, worker_id: &str) -> DbResult<()> {
        (**self).clear_lock(topic, worker_id)
    }

    fn register_error(&self, topic: &str, worker_id: &str) -> DbResult<()> {
        (**self).register_error(topic, worker_id)
    }

    fn ping_empty_topics(&self, exclude: &[String]) -> DbResult<usize> {
        (**self).ping_empty_topics(exclude)
    }

    fn topic_locks(&self) -> DbResult<Vec<TopicLock>> {
        (**self).topic_locks()
    }

    fn lock_config(&self) -> &LockConfig {
        (**self).lock_config()
    }
}
