//! Worker pool integration tests.
//!
//! - Each runner is started once and stopped once
//! - Crashing runners restart with backoff; stopped pools restart nothing
//! - A panicking runner only takes down its own thread

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use outbox_relay::{BackoffConfig, Poller, PoolConfig, Runner, RunnerError, WorkerPool};

use support::{eventually, ScriptedRunner};

fn fast_backoff() -> PoolConfig {
    PoolConfig {
        backoff: BackoffConfig {
            initial_delay_ms: 5,
            max_delay_ms: 20,
            multiplier: 2.0,
        },
        ..PoolConfig::default()
    }
}

// ============================================================================
// Test 1: start() once per runner, stop() once per runner
// ============================================================================

#[test]
fn starts_and_stops_each_runner_once() {
    let a = Arc::new(ScriptedRunner::new("a"));
    let b = Arc::new(ScriptedRunner::new("b"));
    let pool = WorkerPool::new(vec![a.clone() as Arc<dyn Runner>, b.clone() as Arc<dyn Runner>]);

    pool.start().unwrap();
    assert!(eventually(|| a.starts() == 1 && b.starts() == 1));
    assert_eq!(pool.active_workers(), 2);

    pool.stop();
    pool.stop();

    assert_eq!((a.starts(), b.starts()), (1, 1));
    assert_eq!((a.stops(), b.stops()), (1, 1));
    assert_eq!(pool.active_workers(), 0);

    thread::sleep(Duration::from_millis(50));
    assert_eq!((a.starts(), b.starts()), (1, 1));
}

// ============================================================================
// Test 2: A crashing runner is restarted until it runs
// ============================================================================

#[test]
fn crashed_runner_is_restarted() {
    let flaky = Arc::new(ScriptedRunner::failing("flaky", 3));
    let pool = WorkerPool::new(vec![flaky.clone() as Arc<dyn Runner>]).with_config(fast_backoff());

    pool.start().unwrap();
    assert!(eventually(|| flaky.starts() == 4 && flaky.is_running()));

    pool.stop();
    assert_eq!(flaky.starts(), 4);
    assert_eq!(flaky.stops(), 1);
}

// ============================================================================
// Test 3: Stopping during backoff does not restart the runner
// ============================================================================

#[test]
fn stop_during_backoff_prevents_restart() {
    let broken = Arc::new(ScriptedRunner::failing("broken", usize::MAX));
    let config = PoolConfig {
        backoff: BackoffConfig {
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        },
        ..PoolConfig::default()
    };
    let pool = WorkerPool::new(vec![broken.clone() as Arc<dyn Runner>]).with_config(config);

    pool.start().unwrap();
    assert!(eventually(|| broken.starts() == 1));

    let started = Instant::now();
    pool.stop();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(broken.starts(), 1);
    assert_eq!(pool.active_workers(), 0);
}

// ============================================================================
// Test 4: A runner that returns on its own is not restarted
// ============================================================================

#[test]
fn finished_runner_is_not_restarted() {
    let once = Arc::new(ScriptedRunner::finishing("once"));
    let pool = WorkerPool::new(vec![once.clone() as Arc<dyn Runner>]).with_config(fast_backoff());

    pool.start().unwrap();
    assert!(eventually(|| pool.active_workers() == 0));
    thread::sleep(Duration::from_millis(30));

    assert_eq!(once.starts(), 1);
    pool.stop();
}

// ============================================================================
// Test 5: A panic ends only its own worker thread
// ============================================================================

#[test]
fn panicking_runner_does_not_affect_others() {
    let steady = Arc::new(ScriptedRunner::new("steady"));
    let doomed = Arc::new(ScriptedRunner::panicking("doomed"));
    let pool = WorkerPool::new(vec![
        steady.clone() as Arc<dyn Runner>,
        doomed.clone() as Arc<dyn Runner>,
    ])
    .with_config(fast_backoff());

    pool.start().unwrap();
    assert!(eventually(|| doomed.starts() == 1 && pool.active_workers() == 1));
    assert!(eventually(|| steady.is_running()));
    thread::sleep(Duration::from_millis(30));

    assert_eq!(doomed.starts(), 1);
    assert!(steady.is_running());

    pool.stop();
    assert_eq!(steady.stops(), 1);
}

// ============================================================================
// Test 6: Pollers run on the pool until stopped
// ============================================================================

#[test]
fn poller_runs_until_stopped() {
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&polls);
    let poller = Poller::new(
        "counter",
        move || -> Result<(), RunnerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        Duration::from_millis(5),
    );
    let pool = WorkerPool::new(vec![Arc::new(poller) as Arc<dyn Runner>]);

    pool.start().unwrap();
    assert!(eventually(|| polls.load(Ordering::SeqCst) >= 3));
    pool.stop();

    let after_stop = polls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(polls.load(Ordering::SeqCst), after_stop);
}

// ============================================================================
// Test 7: Invalid backoff settings refuse to start
// ============================================================================

#[test]
fn invalid_backoff_is_rejected() {
    let runner = Arc::new(ScriptedRunner::new("idle"));
    let mut config = PoolConfig::default();
    config.backoff.multiplier = 0.5;
    let pool = WorkerPool::new(vec![runner.clone() as Arc<dyn Runner>]).with_config(config);

    assert!(matches!(pool.start(), Err(RunnerError::Config(_))));
    assert_eq!(runner.starts(), 0);
}
