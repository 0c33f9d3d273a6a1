use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ConfigError;

use super::backoff::{Backoff, BackoffConfig};
use super::runner::{Runner, RunnerError};
use super::stop_signal::StopSignal;

/// Worker pool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// How long `stop()` waits for worker threads to finish.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backoff.validate()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Runs each runner on its own thread and restarts it when it crashes.
///
/// The pool is itself a [`Runner`]: `start` launches one thread per runner and
/// returns, and `stop` stops every runner and waits for the threads. That
/// makes it the usual thing to hand to a
/// [`ShutdownController`](crate::shutdown::ShutdownController).
///
/// ## Example
///
/// ```ignore
/// let pool = WorkerPool::new(vec![Arc::new(relay_a), Arc::new(relay_b)]);
/// pool.start()?;
/// // ...
/// pool.stop();
/// ```
pub struct WorkerPool {
    id: String,
    runners: Vec<Arc<dyn Runner>>,
    config: PoolConfig,
    stop_signal: StopSignal,
    stopping: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(runners: Vec<Arc<dyn Runner>>) -> Self {
        WorkerPool {
            id: "worker-pool".to_string(),
            runners,
            config: PoolConfig::default(),
            stop_signal: StopSignal::new(),
            stopping: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn runners(&self) -> &[Arc<dyn Runner>] {
        &self.runners
    }

    /// Number of worker threads still running.
    pub fn active_workers(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Block until every worker thread has ended.
    pub fn wait(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            if handle.join().is_err() {
                warn!(pool = %self.id, "Worker thread ended with a panic");
            }
        }
    }

    fn join_until(&self, handles: Vec<JoinHandle<()>>, deadline: Instant) {
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if !handle.is_finished() {
                let name = handle.thread().name().unwrap_or("unnamed").to_string();
                warn!(
                    pool = %self.id,
                    worker = %name,
                    "Worker did not terminate before shutdown timeout"
                );
                continue;
            }
            if handle.join().is_err() {
                warn!(pool = %self.id, "Worker thread ended with a panic");
            }
        }
    }
}

impl Runner for WorkerPool {
    fn id(&self) -> &str {
        &self.id
    }

    fn start(&self) -> Result<(), RunnerError> {
        self.config.validate()?;
        self.stopping.store(false, Ordering::SeqCst);
        self.stop_signal.reset();

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|handle| !handle.is_finished());
        if !handles.is_empty() {
            warn!(pool = %self.id, running = handles.len(), "Worker pool already started");
            return Ok(());
        }

        for runner in &self.runners {
            let runner = Arc::clone(runner);
            let stop_signal = self.stop_signal.clone();
            let backoff = self.config.backoff.clone();
            let handle = thread::Builder::new()
                .name(format!("{}:{}", self.id, runner.id()))
                .spawn(move || supervise(runner, stop_signal, backoff))
                .map_err(RunnerError::other)?;
            handles.push(handle);
        }

        info!(pool = %self.id, workers = handles.len(), "Worker pool started");
        Ok(())
    }

    fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(pool = %self.id, "Stopping worker pool");

        self.stop_signal.stop();
        for runner in &self.runners {
            runner.stop();
        }

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        self.join_until(handles, Instant::now() + self.config.shutdown_timeout());
        info!(pool = %self.id, "Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_signal.stop();
    }
}

/// Body of one worker thread.
fn supervise(runner: Arc<dyn Runner>, stop_signal: StopSignal, backoff: BackoffConfig) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_with_restarts(runner.as_ref(), &stop_signal, backoff)
    }));
    if let Err(payload) = outcome {
        error!(
            runner = %runner.id(),
            panic = %panic_message(payload.as_ref()),
            "Runner panicked; its worker thread is exiting"
        );
        panic::resume_unwind(payload);
    }
}

fn run_with_restarts(runner: &dyn Runner, stop_signal: &StopSignal, config: BackoffConfig) {
    let mut backoff = Backoff::new(config);
    let mut rng = rand::thread_rng();

    while !stop_signal.is_stopped() {
        match runner.start() {
            Ok(()) => {
                info!(runner = %runner.id(), "Runner finished");
                return;
            }
            Err(err) => {
                if stop_signal.is_stopped() {
                    return;
                }
                let delay = backoff.next_delay(&mut rng);
                error!(
                    runner = %runner.id(),
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Runner crashed; restarting after backoff"
                );
                if stop_signal.wait_timeout(delay) {
                    return;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
