//! Topic ownership shared across relay workers.
//!
//! A topic's lock row moves between three states:
//! - `Idle` - nobody owns it; any worker may lock it
//! - `Owned(worker)` - one worker is draining it and heartbeats while it does
//! - `Errored` - processing failed; nobody may lock it until the quarantine
//!   window has passed
//!
//! An owner that stops heartbeating for longer than the staleness window is
//! treated as crashed and its topic can be taken over.

mod coordinator;
mod in_memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod topic_lock;

pub use coordinator::TopicCoordinator;
pub use in_memory::InMemoryTopicCoordinator;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTopicCoordinator;
pub use topic_lock::{LockConfig, LockState, TopicLock, MAX_LOCK_WINDOW_MS};
