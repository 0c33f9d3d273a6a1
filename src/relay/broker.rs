use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::publisher::{ProducedMessage, PublishError, Publisher};

#[derive(Default)]
struct BrokerState {
    batches: Vec<Vec<ProducedMessage>>,
    max_batch_size: Option<usize>,
    scripted_failures: VecDeque<PublishError>,
}

/// An in-process broker that records every accepted batch.
///
/// It can be told to reject batches above a size with
/// `PublishError::MessageTooLarge`, or to fail the next few publish calls.
/// Cloning shares the recorded state.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reject any batch with more than `max` messages as too large.
    pub fn with_max_batch_size(self, max: usize) -> Self {
        self.state().max_batch_size = Some(max);
        self
    }

    /// Fail the next publish call with `error`. Calls queue up.
    pub fn fail_next(&self, error: PublishError) {
        self.state().scripted_failures.push_back(error);
    }

    /// Every accepted message, in delivery order.
    pub fn published(&self) -> Vec<ProducedMessage> {
        self.state().batches.iter().flatten().cloned().collect()
    }

    /// Accepted messages for one topic, in delivery order.
    pub fn published_to(&self, topic: &str) -> Vec<ProducedMessage> {
        self.published()
            .into_iter()
            .filter(|message| message.topic == topic)
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.state().batches.len()
    }
}

impl Publisher for InMemoryBroker {
    fn publish(&self, batch: &[ProducedMessage]) -> Result<(), PublishError> {
        let mut state = self.state();
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        if let Some(max) = state.max_batch_size {
            if batch.len() > max {
                return Err(PublishError::MessageTooLarge(format!(
                    "batch of {} exceeds broker limit of {}",
                    batch.len(),
                    max
                )));
            }
        }
        state.batches.push(batch.to_vec());
        Ok(())
    }
}
