use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Exponential backoff between runner restarts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first restart.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound of the un-jittered delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor per failed attempt. Must be >= 1.0.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::Zero {
                field: "backoff.initial_delay_ms",
            });
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff.max_delay_ms ({}) is below backoff.initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff.multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Retry state for one supervised runner.
///
/// The delay for attempt `n` is `initial * multiplier^n`, capped at the
/// maximum, and then jittered into `[delay / 2, delay]` so restarts of many
/// crashed workers spread out.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Backoff { config, attempt: 0 }
    }

    /// Number of delays handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// The un-jittered delay for the current attempt.
    pub fn ceiling(&self) -> Duration {
        let grown = self.config.initial_delay_ms as f64
            * self.config.multiplier.powi(self.attempt.min(i32::MAX as u32) as i32);
        Duration::from_millis(grown.min(self.config.max_delay_ms as f64) as u64)
    }

    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let ceiling = self.ceiling().as_millis() as u64;
        let floor = ceiling / 2;
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(rng.gen_range(floor..=ceiling))
    }
}
