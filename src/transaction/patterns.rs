//! Message patterns for retryable database errors.
//!
//! Drivers report deadlocks and lock timeouts as plain error text, so they are
//! recognised by substring. Matching is case-insensitive.

/// Deadlock and lock-timeout messages from MySQL, PostgreSQL, and SQLite.
pub const DEADLOCK_PATTERNS: &[&str] = &[
    // MySQL / MariaDB
    "deadlock found when trying to get lock",
    "lock wait timeout exceeded",
    // PostgreSQL
    "deadlock detected",
    "could not obtain lock",
    "canceling statement due to lock timeout",
    // SQLite
    "database is locked",
    "database table is locked",
];

/// Connection-level failures that a fresh attempt may get past.
pub const CONNECTION_PATTERNS: &[&str] = &[
    "mysql server has gone away",
    "lost connection to mysql server",
    "server closed the connection unexpectedly",
    "terminating connection due to administrator command",
    "connection reset",
    "broken pipe",
];

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    let message = message.to_ascii_lowercase();
    patterns.iter().any(|pattern| message.contains(pattern))
}

pub fn is_deadlock(message: &str) -> bool {
    matches_any(message, DEADLOCK_PATTERNS)
}

/// Lock-wait or connection errors: safe to retry a delete after revalidating.
pub fn is_transient(message: &str) -> bool {
    is_deadlock(message) || matches_any(message, CONNECTION_PATTERNS)
}
