use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Messages handed to the broker, per topic.
pub const MESSAGES_PROCESSED: &str = "outbox.messages_processed";
/// Rows waiting in the outbox, per topic.
pub const PENDING_MESSAGES: &str = "outbox.pending_messages";
/// Seconds since the topic last showed progress while rows are waiting.
pub const MAX_WAIT_SECONDS: &str = "outbox.pending_max_wait_seconds";

/// Where the relay reports counters and gauges. Purely informational.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str, topic: &str, by: u64);

    fn gauge(&self, name: &'static str, topic: &str, value: f64);
}

/// Emits every metric as a `tracing` debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn increment(&self, name: &'static str, topic: &str, by: u64) {
        debug!(metric = name, topic = %topic, by, "counter");
    }

    fn gauge(&self, name: &'static str, topic: &str, value: f64) {
        debug!(metric = name, topic = %topic, value, "gauge");
    }
}

#[derive(Default)]
struct Recorded {
    counters: HashMap<(&'static str, String), u64>,
    gauges: HashMap<(&'static str, String), f64>,
}

/// Keeps metrics in memory so they can be inspected.
#[derive(Clone, Default)]
pub struct InMemoryMetrics {
    recorded: Arc<Mutex<Recorded>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn counter(&self, name: &'static str, topic: &str) -> u64 {
        self.recorded()
            .counters
            .get(&(name, topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Last value set for a gauge.
    pub fn gauge_value(&self, name: &'static str, topic: &str) -> Option<f64> {
        self.recorded()
            .gauges
            .get(&(name, topic.to_string()))
            .copied()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &'static str, topic: &str, by: u64) {
        *self
            .recorded()
            .counters
            .entry((name, topic.to_string()))
            .or_default() += by;
    }

    fn gauge(&self, name: &'static str, topic: &str, value: f64) {
        self.recorded()
            .gauges
            .insert((name, topic.to_string()), value);
    }
}
