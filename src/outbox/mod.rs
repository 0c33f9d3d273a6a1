//! Outbox - the table of messages waiting to be relayed to the broker.
//!
//! - `OutboxStore` - Trait over the persisted table
//! - `InMemoryOutboxStore` - Shared in-process store, mostly for tests
//! - `SqliteOutboxStore` - `outbox_messages` table in SQLite (requires `sqlite` feature)
//! - `compact` - Last-message-per-key compaction

mod compact;
mod in_memory;
mod message;
#[cfg(feature = "sqlite")]
mod sqlite;
mod store;

pub use compact::compact;
pub use in_memory::InMemoryOutboxStore;
pub use message::{MessageId, NewOutboxMessage, OutboxMessage, TopicBacklog};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteOutboxStore;
pub use store::OutboxStore;
