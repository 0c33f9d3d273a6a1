//! Process supervision: long-lived runners on a fixed set of threads.
//!
//! - `Runner` - The `id` / `start` / `stop` contract every supervised loop implements
//! - `WorkerPool` - One thread per runner, restart with jittered exponential backoff
//! - `Poller` - Generic fixed-interval polling loop
//! - `StopSignal` - Cooperative, wakeable stop flag shared by loops and the pool

mod backoff;
mod poller;
mod runner;
mod stop_signal;
mod worker_pool;

pub use backoff::{Backoff, BackoffConfig};
pub use poller::{PollTask, Poller};
pub use runner::{Runner, RunnerError};
pub use stop_signal::StopSignal;
pub use worker_pool::{PoolConfig, WorkerPool};
