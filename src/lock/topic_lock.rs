use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted staleness or quarantine window: 30 days.
pub const MAX_LOCK_WINDOW_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Windows that decide when a topic lock may be taken over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long an owner may go without a heartbeat before its lock is
    /// considered abandoned.
    #[serde(default = "default_staleness_window_ms")]
    pub staleness_window_ms: u64,

    /// How long a topic stays quarantined after a processing error.
    #[serde(default = "default_quarantine_window_ms")]
    pub quarantine_window_ms: u64,
}

fn default_staleness_window_ms() -> u64 {
    60_000
}

fn default_quarantine_window_ms() -> u64 {
    60_000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            staleness_window_ms: default_staleness_window_ms(),
            quarantine_window_ms: default_quarantine_window_ms(),
        }
    }
}

impl LockConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    pub fn quarantine_window(&self) -> Duration {
        Duration::from_millis(self.quarantine_window_ms)
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_quarantine_window(mut self, window: Duration) -> Self {
        self.quarantine_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Both windows must be non-zero and at most [`MAX_LOCK_WINDOW_MS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("lock.staleness_window_ms", self.staleness_window_ms),
            ("lock.quarantine_window_ms", self.quarantine_window_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
            if value > MAX_LOCK_WINDOW_MS {
                return Err(ConfigError::OutOfRange {
                    field,
                    min: 1,
                    max: MAX_LOCK_WINDOW_MS,
                    actual: value,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, self.staleness_window())
    }

    pub(crate) fn quarantined_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, self.quarantine_window())
    }
}

/// `now - window`, saturating at the earliest representable time.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Ownership state of a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Owned(String),
    Errored,
}

/// One row of the topic lock table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicLock {
    pub topic: String,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub error: bool,
    pub retries: i64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl TopicLock {
    pub fn new(topic: impl Into<String>) -> Self {
        TopicLock {
            topic: topic.into(),
            locked_by: None,
            locked_at: None,
            error: false,
            retries: 0,
            last_processed_at: None,
        }
    }

    pub fn state(&self) -> LockState {
        match (&self.locked_by, self.error) {
            (Some(owner), _) => LockState::Owned(owner.clone()),
            (None, true) => LockState::Errored,
            (None, false) => LockState::Idle,
        }
    }

    pub fn is_owned_by(&self, worker_id: &str) -> bool {
        self.locked_by.as_deref() == Some(worker_id)
    }

    /// Whether `lock()` may take this row at `now`.
    pub(crate) fn is_claimable(&self, now: DateTime<Utc>, config: &LockConfig) -> bool {
        let older_than = |cutoff: DateTime<Utc>| self.locked_at.map_or(true, |at| at < cutoff);
        if self.error {
            older_than(config.quarantined_after(now))
        } else {
            self.locked_by.is_none() || older_than(config.stale_before(now))
        }
    }
}
