use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::clock::{Sleeper, ThreadSleeper};
use crate::db::DbError;

/// Errors that can tell whether they were caused by a deadlock.
pub trait DeadlockAware {
    fn is_deadlock(&self) -> bool;
}

impl DeadlockAware for DbError {
    fn is_deadlock(&self) -> bool {
        DbError::is_deadlock(self)
    }
}

/// Retries a unit of database work when it loses a deadlock.
///
/// The unit is re-run from the start, so it must open its own transaction and
/// must not have side effects outside of it. Non-deadlock errors are returned
/// on the first failure.
#[derive(Clone)]
pub struct TransactionGuard {
    extra_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl TransactionGuard {
    pub fn new() -> Self {
        TransactionGuard {
            extra_attempts: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(5500),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Number of attempts after the first one.
    pub fn with_extra_attempts(mut self, attempts: u32) -> Self {
        self.extra_attempts = attempts;
        self
    }

    /// Bounds of the random pause between attempts.
    pub fn with_delay_range(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run `work`, retrying it on deadlock.
    pub fn wrap<T, E, F>(&self, mut work: F) -> Result<T, E>
    where
        E: DeadlockAware + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match work() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_deadlock() && attempt < self.extra_attempts => {
                    attempt += 1;
                    let delay = self.jittered_delay();
                    warn!(
                        attempt,
                        max_attempts = self.extra_attempts + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Deadlock detected, retrying transaction"
                    );
                    self.sleeper.sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run `work` in a transaction on `db`, retrying the whole transaction on
    /// deadlock.
    #[cfg(feature = "sqlite")]
    pub fn transaction<T, F>(&self, db: &crate::db::SqliteDatabase, work: F) -> Result<T, DbError>
    where
        F: Fn(&rusqlite::Transaction<'_>) -> Result<T, DbError>,
    {
        self.wrap(|| db.transaction(&work))
    }

    fn jittered_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for TransactionGuard {
    fn default() -> Self {
        Self::new()
    }
}
