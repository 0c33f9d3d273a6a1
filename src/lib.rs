//! Transactional outbox relay.
//!
//! Rows written to an outbox table inside business transactions are moved
//! into a message broker by a pool of relay workers. Each topic is owned by
//! at most one worker at a time; crashed owners are detected by heartbeat
//! staleness and failing topics are quarantined.
//!
//! - [`outbox`] - the outbox table and last-message-per-key compaction
//! - [`lock`] - per-topic ownership shared by all workers
//! - [`transaction`] - deadlock-aware retries around database work
//! - [`relay`] - the relay loop and the broker seam
//! - [`pool`] - supervised runners with restart backoff
//! - [`shutdown`] - signal-driven stop of a runner (unix only)

pub mod clock;
pub mod db;
mod error;
pub mod lock;
pub mod outbox;
pub mod pool;
pub mod relay;
#[cfg(unix)]
pub mod shutdown;
pub mod transaction;

pub use clock::{Clock, ManualClock, RecordingSleeper, Sleeper, SystemClock, ThreadSleeper};
pub use db::{DbError, DbResult};
#[cfg(feature = "sqlite")]
pub use db::SqliteDatabase;
pub use error::ConfigError;
pub use lock::{
    InMemoryTopicCoordinator, LockConfig, LockState, TopicCoordinator, TopicLock,
    MAX_LOCK_WINDOW_MS,
};
#[cfg(feature = "sqlite")]
pub use lock::SqliteTopicCoordinator;
pub use outbox::{
    compact, InMemoryOutboxStore, MessageId, NewOutboxMessage, OutboxMessage, OutboxStore,
    TopicBacklog,
};
#[cfg(feature = "sqlite")]
pub use outbox::SqliteOutboxStore;
pub use pool::{
    Backoff, BackoffConfig, PollTask, Poller, PoolConfig, Runner, RunnerError, StopSignal,
    WorkerPool,
};
pub use relay::{
    CompactionPolicy, InMemoryBroker, InMemoryMetrics, LogPublisher, MetricsSink, OutboxRelay,
    ProducedMessage, PublishError, Publisher, RelayConfig, RelayError, RelayStats, TopicOutcome,
    TracingMetrics,
};
#[cfg(unix)]
pub use shutdown::{ShutdownConfig, ShutdownController, ShutdownError, ShutdownHandle};
pub use transaction::{DeadlockAware, TransactionGuard};
