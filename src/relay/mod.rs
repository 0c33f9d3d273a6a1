//! Relaying outbox rows to the message broker.
//!
//! - [`OutboxRelay`]: the per-worker loop that locks, drains, and releases topics
//! - [`Publisher`]: the broker producer seam, with [`LogPublisher`] and [`InMemoryBroker`]
//! - [`MetricsSink`]: counters and gauges emitted by the relay
//! - [`RelayConfig`]: batch sizes, delete retries, compaction, and timing

mod broker;
mod config;
mod error;
mod metrics;
mod outbox_relay;
mod publisher;
mod stats;

pub use broker::InMemoryBroker;
pub use config::{CompactionPolicy, RelayConfig, MAX_DELETE_CHUNK_SIZE};
pub use error::RelayError;
pub use metrics::{
    InMemoryMetrics, MetricsSink, TracingMetrics, MAX_WAIT_SECONDS, MESSAGES_PROCESSED,
    PENDING_MESSAGES,
};
pub use outbox_relay::{DrainSummary, OutboxRelay, TopicOutcome};
pub use publisher::{LogPublisher, ProducedMessage, PublishError, Publisher};
pub use stats::RelayStats;
