use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lock::LockConfig;

/// Which topics get last-message-per-key compaction before publishing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPolicy {
    #[default]
    None,
    All,
    Topics(Vec<String>),
}

impl CompactionPolicy {
    pub fn applies_to(&self, topic: &str) -> bool {
        match self {
            CompactionPolicy::None => false,
            CompactionPolicy::All => true,
            CompactionPolicy::Topics(topics) => topics.iter().any(|t| t == topic),
        }
    }
}

/// Largest number of rows removed by one delete statement.
pub const MAX_DELETE_CHUNK_SIZE: usize = 10;

/// Settings for one outbox relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Rows fetched and published per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows per delete statement after a successful publish.
    #[serde(default = "default_delete_chunk_size")]
    pub delete_chunk_size: usize,

    /// Attempts per delete chunk on lock-wait or connection errors.
    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: u32,

    #[serde(default = "default_delete_retry_delay_ms")]
    pub delete_retry_delay_ms: u64,

    #[serde(default)]
    pub compaction: CompactionPolicy,

    /// Pause between passes over the outbox.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Longest a batch cycle should take between heartbeats. Must stay below
    /// half the lock staleness window.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default)]
    pub lock: LockConfig,
}

fn default_batch_size() -> usize {
    1000
}

fn default_delete_chunk_size() -> usize {
    MAX_DELETE_CHUNK_SIZE
}

fn default_delete_attempts() -> u32 {
    3
}

fn default_delete_retry_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delete_chunk_size: default_delete_chunk_size(),
            delete_attempts: default_delete_attempts(),
            delete_retry_delay_ms: default_delete_retry_delay_ms(),
            compaction: CompactionPolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            lock: LockConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_compaction(mut self, policy: CompactionPolicy) -> Self {
        self.compaction = policy;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_delete_retry_delay(mut self, delay: Duration) -> Self {
        self.delete_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn delete_retry_delay(&self) -> Duration {
        Duration::from_millis(self.delete_retry_delay_ms)
    }

    /// Check this config against its own [`LockConfig`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_against(&self.lock)
    }

    /// Check this config against the lock windows a coordinator actually
    /// enforces, which may differ from `self.lock`.
    pub fn validate_against(&self, lock: &LockConfig) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero { field: "batch_size" });
        }
        if !(1..=MAX_DELETE_CHUNK_SIZE).contains(&self.delete_chunk_size) {
            return Err(ConfigError::OutOfRange {
                field: "delete_chunk_size",
                min: 1,
                max: MAX_DELETE_CHUNK_SIZE as u64,
                actual: self.delete_chunk_size as u64,
            });
        }
        if self.delete_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "delete_attempts",
            });
        }
        lock.validate()?;
        if self.heartbeat_interval_ms == 0
            || self.heartbeat_interval_ms.saturating_mul(2) >= lock.staleness_window_ms
        {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat_ms: self.heartbeat_interval_ms,
                staleness_ms: lock.staleness_window_ms,
            });
        }
        Ok(())
    }
}
