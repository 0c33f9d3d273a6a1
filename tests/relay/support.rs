//! Shared fixtures for relay tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use outbox_relay::{
    DbError, DbResult, InMemoryBroker, InMemoryMetrics, InMemoryOutboxStore,
    InMemoryTopicCoordinator, ManualClock, MessageId, NewOutboxMessage, OutboxMessage,
    OutboxRelay, OutboxStore, RecordingSleeper, RelayConfig, TopicBacklog,
};

pub type MemoryRelay = OutboxRelay<InMemoryOutboxStore, InMemoryTopicCoordinator, InMemoryBroker>;

/// One relay over in-memory backends, with handles to everything it touches.
pub struct Harness {
    pub relay: MemoryRelay,
    pub store: InMemoryOutboxStore,
    pub coordinator: InMemoryTopicCoordinator,
    pub broker: InMemoryBroker,
    pub metrics: InMemoryMetrics,
    pub clock: ManualClock,
    pub sleeper: RecordingSleeper,
}

impl Harness {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_broker(config, InMemoryBroker::new())
    }

    pub fn with_broker(config: RelayConfig, broker: InMemoryBroker) -> Self {
        let clock = ManualClock::default();
        let store = InMemoryOutboxStore::with_clock(Arc::new(clock.clone()));
        let coordinator =
            InMemoryTopicCoordinator::with_clock(config.lock.clone(), Arc::new(clock.clone()));
        let metrics = InMemoryMetrics::new();
        let sleeper = RecordingSleeper::advancing(clock.clone());
        let relay = OutboxRelay::new(store.clone(), coordinator.clone(), broker.clone(), config)
            .unwrap()
            .with_worker_id("relay-a")
            .with_metrics(Arc::new(metrics.clone()))
            .with_clock(Arc::new(clock.clone()))
            .with_sleeper(Arc::new(sleeper.clone()));
        Harness {
            relay,
            store,
            coordinator,
            broker,
            metrics,
            clock,
            sleeper,
        }
    }

    pub fn enqueue(&self, topic: &str, key: Option<&str>, payload: &str) -> OutboxMessage {
        let mut message = NewOutboxMessage::new(topic, payload);
        if let Some(key) = key {
            message = message.with_key(key);
        }
        self.store.enqueue(message).unwrap()
    }
}

/// Payloads of the messages a broker accepted for `topic`, as strings.
pub fn payloads(broker: &InMemoryBroker, topic: &str) -> Vec<String> {
    broker
        .published_to(topic)
        .into_iter()
        .map(|message| String::from_utf8(message.payload.unwrap_or_default()).unwrap())
        .collect()
}

/// An outbox store whose deletes fail a scripted number of times.
#[derive(Clone)]
pub struct FlakyStore {
    inner: InMemoryOutboxStore,
    failures: Arc<Mutex<Vec<String>>>,
    delete_calls: Arc<AtomicUsize>,
    delete_sizes: Arc<Mutex<Vec<usize>>>,
    revalidations: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryOutboxStore) -> Self {
        FlakyStore {
            inner,
            failures: Arc::default(),
            delete_calls: Arc::default(),
            delete_sizes: Arc::default(),
            revalidations: Arc::default(),
        }
    }

    /// Fail the next delete calls with these messages, in order.
    pub fn fail_deletes(&self, messages: &[&str]) {
        let mut failures = self.failures.lock().unwrap();
        failures.extend(messages.iter().rev().map(|m| m.to_string()));
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of ids passed to each delete call, failed calls included.
    pub fn delete_sizes(&self) -> Vec<usize> {
        self.delete_sizes.lock().unwrap().clone()
    }

    pub fn revalidations(&self) -> usize {
        self.revalidations.load(Ordering::SeqCst)
    }
}

impl OutboxStore for FlakyStore {
    fn enqueue(&self, message: NewOutboxMessage) -> DbResult<OutboxMessage> {
        self.inner.enqueue(message)
    }

    fn pending_topics(&self) -> DbResult<Vec<String>> {
        self.inner.pending_topics()
    }

    fn fetch_batch(&self, topic: &str, limit: usize) -> DbResult<Vec<OutboxMessage>> {
        self.inner.fetch_batch(topic, limit)
    }

    fn delete(&self, ids: &[MessageId]) -> DbResult<usize> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.delete_sizes.lock().unwrap().push(ids.len());
        if let Some(message) = self.failures.lock().unwrap().pop() {
            return Err(DbError::Backend(message));
        }
        self.inner.delete(ids)
    }

    fn pending_summary(&self) -> DbResult<Vec<TopicBacklog>> {
        self.inner.pending_summary()
    }

    fn revalidate(&self) -> DbResult<()> {
        self.revalidations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

