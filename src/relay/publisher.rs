use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::info;

use crate::outbox::OutboxMessage;

/// A message as handed to the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub partition_key: Option<String>,
    /// `None` is a tombstone.
    pub payload: Option<Vec<u8>>,
}

impl From<&OutboxMessage> for ProducedMessage {
    fn from(message: &OutboxMessage) -> Self {
        ProducedMessage {
            topic: message.topic.clone(),
            key: message.key.clone(),
            partition_key: message.partition_key().map(String::from),
            payload: message.payload.clone(),
        }
    }
}

/// Error type for publish operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The broker refused a message or batch for its size. Retrying the same
    /// batch can never succeed.
    #[error("message too large: {0}")]
    MessageTooLarge(String),

    /// Any other broker failure.
    #[error("publish failed: {0}")]
    Other(String),
}

impl PublishError {
    pub fn is_too_large(&self) -> bool {
        matches!(self, PublishError::MessageTooLarge(_))
    }
}

/// The broker producer used by the relay.
///
/// `publish` must deliver the batch in order and return only after the broker
/// accepted it; the relay deletes the rows as soon as it returns `Ok`.
pub trait Publisher: Send + Sync {
    fn publish(&self, batch: &[ProducedMessage]) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, batch: &[ProducedMessage]) -> Result<(), PublishError> {
        (**self).publish(batch)
    }
}

/// A publisher that logs messages, optionally into a buffer.
#[derive(Clone, Default)]
pub struct LogPublisher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogPublisher {
    pub fn new() -> Self {
        LogPublisher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogPublisher {
            buffer: Some(buffer),
        }
    }
}

fn render_payload(payload: Option<&[u8]>) -> String {
    match payload {
        None => "<tombstone>".to_string(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => format!("base64:{}", STANDARD.encode(bytes)),
        },
    }
}

impl Publisher for LogPublisher {
    fn publish(&self, batch: &[ProducedMessage]) -> Result<(), PublishError> {
        for message in batch {
            let payload = render_payload(message.payload.as_deref());
            let key = message.key.as_deref().unwrap_or("-");
            match &self.buffer {
                Some(buffer) => {
                    let mut buffer = buffer
                        .lock()
                        .map_err(|_| PublishError::Other("log publisher buffer poisoned".into()))?;
                    buffer.push(format!("[{}] {} {}", message.topic, key, payload));
                }
                None => info!(topic = %message.topic, key = %key, payload = %payload, "Published"),
            }
        }
        Ok(())
    }
}
