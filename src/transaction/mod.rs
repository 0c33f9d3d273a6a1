//! Deadlock-aware transaction retries.

mod guard;
pub mod patterns;

pub use guard::{DeadlockAware, TransactionGuard};
