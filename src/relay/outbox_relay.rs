//! The relay loop: drains the outbox topic by topic into the broker.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::clock::{Clock, Sleeper, SystemClock, ThreadSleeper};
use crate::db::DbError;
use crate::error::ConfigError;
use crate::lock::TopicCoordinator;
use crate::outbox::{compact, MessageId, OutboxStore};
use crate::pool::{Runner, RunnerError, StopSignal};
use crate::transaction::TransactionGuard;

use super::config::RelayConfig;
use super::error::RelayError;
use super::metrics::{
    MetricsSink, TracingMetrics, MAX_WAIT_SECONDS, MESSAGES_PROCESSED, PENDING_MESSAGES,
};
use super::publisher::{ProducedMessage, Publisher};
use super::stats::RelayStats;

static NEXT_RELAY: AtomicUsize = AtomicUsize::new(1);

/// Totals for one drained topic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    pub batches: usize,
    pub published: usize,
    pub deleted: usize,
    /// The heartbeat found another worker owning the topic, so draining
    /// stopped early.
    pub ownership_lost: bool,
}

/// What happened to one topic during a pass.
#[derive(Debug)]
pub enum TopicOutcome {
    /// Another worker owns the topic, or it is quarantined.
    Skipped,
    /// Drained and released.
    Drained(DrainSummary),
    /// Processing failed and the topic was quarantined.
    Failed(RelayError),
}

/// Moves outbox rows into the broker, one owned topic at a time.
///
/// Each pass lists the topics with pending rows, locks each one through the
/// [`TopicCoordinator`], publishes its rows in id order in batches, deletes
/// what was published, and releases the topic. A failing topic is quarantined
/// and the pass moves on. Delivery is at-least-once: rows that were published
/// but could not be deleted are published again later.
///
/// ## Example
///
/// ```ignore
/// let relay = OutboxRelay::new(store, coordinator, broker, RelayConfig::default())?
///     .with_worker_id("relay-1");
/// let pool = WorkerPool::new(vec![Arc::new(relay)]);
/// pool.start()?;
/// ```
pub struct OutboxRelay<S, C, P> {
    worker_id: String,
    store: S,
    coordinator: C,
    publisher: P,
    config: RelayConfig,
    guard: TransactionGuard,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    stop_signal: StopSignal,
    stats: Mutex<RelayStats>,
}

impl<S, C, P> OutboxRelay<S, C, P>
where
    S: OutboxStore,
    C: TopicCoordinator,
    P: Publisher,
{
    /// Create a relay. Fails if `config` does not validate.
    ///
    /// The heartbeat interval is checked against the coordinator's own lock
    /// windows, not `config.lock`.
    pub fn new(
        store: S,
        coordinator: C,
        publisher: P,
        config: RelayConfig,
    ) -> Result<Self, ConfigError> {
        config.validate_against(coordinator.lock_config())?;
        Ok(Self {
            worker_id: format!(
                "relay-{}-{}",
                std::process::id(),
                NEXT_RELAY.fetch_add(1, Ordering::Relaxed)
            ),
            store,
            coordinator,
            publisher,
            config,
            guard: TransactionGuard::new(),
            metrics: Arc::new(TracingMetrics),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(ThreadSleeper),
            stop_signal: StopSignal::new(),
            stats: Mutex::new(RelayStats::default()),
        })
    }

    /// Set the worker ID recorded as the owner of locked topics.
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_guard(mut self, guard: TransactionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sleeper used between delete retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, update: impl FnOnce(&mut RelayStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut *stats);
    }

    /// One pass over every topic with pending rows.
    ///
    /// Per-topic failures are handled inside the pass; an `Err` means the
    /// store or coordinator itself could not be reached.
    pub fn run_pass(&self) -> Result<Vec<(String, TopicOutcome)>, RelayError> {
        let topics = self.guard.wrap(|| self.store.pending_topics())?;
        let mut outcomes = Vec::with_capacity(topics.len());

        for topic in &topics {
            if self.stop_signal.is_stopped() {
                break;
            }
            let outcome = self.process_topic(topic)?;
            outcomes.push((topic.clone(), outcome));
        }

        let pinged = self.guard.wrap(|| self.coordinator.ping_empty_topics(&topics))?;
        debug!(worker_id = %self.worker_id, pinged, "Pinged idle topics");
        self.send_pending_metrics()?;
        self.record(|stats| stats.passes += 1);
        Ok(outcomes)
    }

    /// Lock, drain, and release a single topic.
    pub fn process_topic(&self, topic: &str) -> Result<TopicOutcome, RelayError> {
        let locked = self
            .guard
            .wrap(|| self.coordinator.lock(topic, &self.worker_id))?;
        if !locked {
            debug!(topic = %topic, worker_id = %self.worker_id, "Could not lock topic, skipping");
            self.record(|stats| stats.lock_skips += 1);
            return Ok(TopicOutcome::Skipped);
        }

        match self.drain_topic(topic) {
            Ok(summary) => {
                self.guard
                    .wrap(|| self.coordinator.clear_lock(topic, &self.worker_id))?;
                info!(
                    topic = %topic,
                    worker_id = %self.worker_id,
                    batches = summary.batches,
                    messages = summary.published,
                    "Topic drained"
                );
                self.record(|stats| stats.topics_drained += 1);
                Ok(TopicOutcome::Drained(summary))
            }
            Err(err) => {
                error!(
                    topic = %topic,
                    worker_id = %self.worker_id,
                    error = %err,
                    "Error processing topic; quarantining it"
                );
                self.guard
                    .wrap(|| self.coordinator.register_error(topic, &self.worker_id))?;
                self.record(|stats| stats.topic_errors += 1);
                Ok(TopicOutcome::Failed(err))
            }
        }
    }

    fn drain_topic(&self, topic: &str) -> Result<DrainSummary, RelayError> {
        let mut summary = DrainSummary::default();
        let compaction = self.config.compaction.applies_to(topic);

        while !self.stop_signal.is_stopped() {
            let cycle_started = self.clock.now();
            let batch = self
                .guard
                .wrap(|| self.store.fetch_batch(topic, self.config.batch_size))?;
            if batch.is_empty() {
                break;
            }

            let fetched = batch.len();
            let ids: Vec<MessageId> = batch.iter().map(|message| message.id).collect();
            let batch = if compaction { compact(batch) } else { batch };
            let produced: Vec<ProducedMessage> = batch.iter().map(ProducedMessage::from).collect();

            self.publish_batch(topic, &ids, &produced)?;
            let deleted = self.delete_messages(topic, &ids)?;

            self.metrics
                .increment(MESSAGES_PROCESSED, topic, produced.len() as u64);
            summary.batches += 1;
            summary.published += produced.len();
            summary.deleted += deleted;
            self.record(|stats| {
                stats.batches += 1;
                stats.messages_published += produced.len();
                stats.messages_deleted += deleted;
            });

            if fetched < self.config.batch_size {
                break;
            }

            let cycle = (self.clock.now() - cycle_started).to_std().unwrap_or_default();
            if cycle > self.config.heartbeat_interval() {
                warn!(
                    topic = %topic,
                    worker_id = %self.worker_id,
                    cycle_ms = cycle.as_millis() as u64,
                    heartbeat_interval_ms = self.config.heartbeat_interval_ms,
                    "Batch took longer than the heartbeat interval"
                );
            }
            let still_owner = self
                .guard
                .wrap(|| self.coordinator.heartbeat(topic, &self.worker_id))?;
            if !still_owner {
                warn!(
                    topic = %topic,
                    worker_id = %self.worker_id,
                    "Lost topic ownership, stopping"
                );
                summary.ownership_lost = true;
                break;
            }
            debug!(topic = %topic, worker_id = %self.worker_id, "Heartbeat sent");
        }

        Ok(summary)
    }

    fn publish_batch(
        &self,
        topic: &str,
        ids: &[MessageId],
        produced: &[ProducedMessage],
    ) -> Result<(), RelayError> {
        match self.publisher.publish(produced) {
            Ok(()) => Ok(()),
            Err(err) if err.is_too_large() => {
                error!(
                    topic = %topic,
                    rows = ids.len(),
                    error = %err,
                    "Batch too large for the broker; deleting its messages"
                );
                self.delete_messages(topic, ids)?;
                Err(RelayError::BatchTooLarge {
                    topic: topic.to_string(),
                    rows: ids.len(),
                    source: err,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Delete rows in small chunks, retrying transient failures per chunk.
    fn delete_messages(&self, topic: &str, ids: &[MessageId]) -> Result<usize, RelayError> {
        let mut deleted = 0;
        for chunk in ids.chunks(self.config.delete_chunk_size) {
            deleted += self.delete_chunk(topic, chunk)?;
        }
        Ok(deleted)
    }

    fn delete_chunk(&self, topic: &str, chunk: &[MessageId]) -> Result<usize, RelayError> {
        let mut attempt = 1;
        loop {
            let err: DbError = match self.store.delete(chunk) {
                Ok(deleted) => return Ok(deleted),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err.into()),
            };
            if attempt >= self.config.delete_attempts {
                return Err(RelayError::DeleteRetryExhausted {
                    topic: topic.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }

            warn!(
                topic = %topic,
                attempt,
                max_attempts = self.config.delete_attempts,
                error = %err,
                "Deleting published messages failed, retrying"
            );
            self.sleeper.sleep(self.config.delete_retry_delay());
            if let Err(reconnect) = self.store.revalidate() {
                warn!(topic = %topic, error = %reconnect, "Could not revalidate outbox connection");
            }
            attempt += 1;
        }
    }

    /// Report backlog size and how long each topic has waited.
    ///
    /// The wait is measured from the later of the topic's last completed
    /// drain and its oldest pending row, so a topic that is being drained
    /// steadily does not look stuck.
    fn send_pending_metrics(&self) -> Result<(), RelayError> {
        let now = self.clock.now();
        let backlog: BTreeMap<String, _> = self
            .store
            .pending_summary()?
            .into_iter()
            .map(|entry| (entry.topic.clone(), entry))
            .collect();
        let last_processed: BTreeMap<String, _> = self
            .coordinator
            .topic_locks()?
            .into_iter()
            .map(|row| (row.topic, row.last_processed_at))
            .collect();

        let topics: BTreeSet<&String> = backlog.keys().chain(last_processed.keys()).collect();
        for topic in topics {
            let (pending, max_wait) = match backlog.get(topic) {
                None => (0, 0.0),
                Some(entry) => {
                    let since = last_processed
                        .get(topic)
                        .copied()
                        .flatten()
                        .map_or(entry.oldest_created_at, |at| at.max(entry.oldest_created_at));
                    let waited = (now - since).num_milliseconds().max(0) as f64 / 1000.0;
                    (entry.pending, waited)
                }
            };
            self.metrics.gauge(PENDING_MESSAGES, topic, pending as f64);
            self.metrics.gauge(MAX_WAIT_SECONDS, topic, max_wait);
        }
        Ok(())
    }
}

impl<S, C, P> Runner for OutboxRelay<S, C, P>
where
    S: OutboxStore,
    C: TopicCoordinator,
    P: Publisher,
{
    fn id(&self) -> &str {
        &self.worker_id
    }

    fn start(&self) -> Result<(), RunnerError> {
        info!(worker_id = %self.worker_id, "Outbox relay started");
        while !self.stop_signal.is_stopped() {
            self.run_pass()?;
            if self.stop_signal.wait_timeout(self.config.poll_interval()) {
                break;
            }
        }
        info!(worker_id = %self.worker_id, "Outbox relay stopped");
        Ok(())
    }

    fn stop(&self) {
        self.stop_signal.stop();
    }
}
