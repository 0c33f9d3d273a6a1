use thiserror::Error;

/// A configuration value that the runtime refuses to start with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        actual: u64,
    },

    #[error(
        "heartbeat interval ({heartbeat_ms}ms) must be less than half the staleness window ({staleness_ms}ms)"
    )]
    HeartbeatTooSlow { heartbeat_ms: u64, staleness_ms: u64 },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
