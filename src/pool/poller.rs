use std::time::Duration;

use tracing::debug;

use super::runner::{Runner, RunnerError};
use super::stop_signal::StopSignal;

/// One iteration of a polling loop.
pub trait PollTask: Send + Sync {
    fn poll(&self) -> Result<(), RunnerError>;
}

impl<F> PollTask for F
where
    F: Fn() -> Result<(), RunnerError> + Send + Sync,
{
    fn poll(&self) -> Result<(), RunnerError> {
        self()
    }
}

/// A runner that calls a task at a fixed interval until stopped.
///
/// A failing poll ends `start` with the error so the worker pool restarts the
/// poller with backoff.
pub struct Poller<T> {
    id: String,
    task: T,
    interval: Duration,
    stop_signal: StopSignal,
}

impl<T: PollTask> Poller<T> {
    pub fn new(id: impl Into<String>, task: T, interval: Duration) -> Self {
        Poller {
            id: id.into(),
            task,
            interval,
            stop_signal: StopSignal::new(),
        }
    }

    pub fn task(&self) -> &T {
        &self.task
    }
}

impl<T: PollTask> Runner for Poller<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn start(&self) -> Result<(), RunnerError> {
        while !self.stop_signal.is_stopped() {
            self.task.poll()?;
            if self.stop_signal.wait_timeout(self.interval) {
                break;
            }
        }
        debug!(runner = %self.id, "Poller stopped");
        Ok(())
    }

    fn stop(&self) {
        self.stop_signal.stop();
    }
}
