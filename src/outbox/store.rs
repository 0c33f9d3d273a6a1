use crate::db::DbResult;

use super::message::{MessageId, NewOutboxMessage, OutboxMessage, TopicBacklog};

/// The persisted table of pending messages.
///
/// Rows are only touched by the worker that currently owns their topic in
/// the topic coordinator; the store itself does no ownership checks.
pub trait OutboxStore: Send + Sync {
    /// Insert a message, assigning its id and creation time.
    fn enqueue(&self, message: NewOutboxMessage) -> DbResult<OutboxMessage>;

    /// Distinct topics with at least one pending row.
    fn pending_topics(&self) -> DbResult<Vec<String>>;

    /// Up to `limit` oldest rows for `topic`, ascending by id.
    fn fetch_batch(&self, topic: &str, limit: usize) -> DbResult<Vec<OutboxMessage>>;

    /// Delete rows by id. Returns how many rows were removed.
    fn delete(&self, ids: &[MessageId]) -> DbResult<usize>;

    /// Count and oldest creation time of pending rows, per topic.
    fn pending_summary(&self) -> DbResult<Vec<TopicBacklog>>;

    /// Make sure the underlying connection is usable before a retry.
    fn revalidate(&self) -> DbResult<()> {
        Ok(())
    }
}

impl<S: OutboxStore + ?Sized> OutboxStore for std::sync::Arc<S> {
    fn enqueue(&self, message: NewOutboxMessage) -> DbResult<OutboxMessage> {
        (**self).enqueue(message)
    }

    fn pending_topics(&self) -> DbResult<Vec<String>> {
        (**self).pending_topics()
    }

    fn fetch_batch(&self, topic: &str, limit: usize) -> DbResult<Vec<OutboxMessage>> {
        (**self).fetch_batch(topic, limit)
    }

    fn delete(&self, ids: &[MessageId]) -> DbResult<usize> {
        (**self).delete(ids)
    }

    fn pending_summary(&self) -> DbResult<Vec<TopicBacklog>> {
        (**self).pending_summary()
    }

    fn revalidate(&self) -> DbResult<()> {
        (**self).revalidate()
    }
}
