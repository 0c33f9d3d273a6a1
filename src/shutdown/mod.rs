//! Signal-driven shutdown.
//!
//! [`ShutdownController`] wraps one runner, usually the
//! [`WorkerPool`](crate::pool::WorkerPool), and calls its `stop()` exactly once
//! when SIGINT, SIGTERM, or another configured signal arrives.

mod controller;

pub use controller::{ShutdownConfig, ShutdownController, ShutdownError, ShutdownHandle};
