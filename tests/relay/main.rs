//! Outbox relay integration tests.
//!
//! Drives `OutboxRelay` against the in-memory and SQLite backends:
//! - Draining topics in id order and releasing their locks
//! - Oversized batches, broker failures, and delete retries
//! - Several relays sharing one outbox
//! - The SQLite store and coordinator on disk

mod support;
