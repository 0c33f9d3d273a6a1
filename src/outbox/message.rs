use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row identifier assigned by the store. Ascending ids are the production
/// order within a topic.
pub type MessageId = i64;

/// A persisted outbox row waiting to be relayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: MessageId,
    pub topic: String,
    pub key: Option<String>,
    pub partition_key: Option<String>,
    /// Encoded payload. `None` is a tombstone for `key`.
    pub payload: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// The partition key, falling back to the message key.
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref().or(self.key.as_deref())
    }
}

/// A message to be written into the outbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOutboxMessage {
    pub topic: String,
    pub key: Option<String>,
    pub partition_key: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl NewOutboxMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            partition_key: None,
            payload: Some(payload.into()),
        }
    }

    /// A tombstone: a keyed message with no payload.
    pub fn tombstone(topic: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: Some(key.into()),
            partition_key: None,
            payload: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    /// Partition key as it will be stored.
    pub(crate) fn resolved_partition_key(&self) -> Option<String> {
        self.partition_key.clone().or_else(|| self.key.clone())
    }
}

/// Pending rows for one topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBacklog {
    pub topic: String,
    pub pending: u64,
    pub oldest_created_at: DateTime<Utc>,
}
