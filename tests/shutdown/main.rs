//! Shutdown controller integration tests.
//!
//! Each test uses its own signal; handlers are process-wide.

#![cfg(unix)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use outbox_relay::{Runner, RunnerError, ShutdownConfig, ShutdownController};
use signal_hook::consts::{SIGUSR1, SIGUSR2, SIGWINCH};
use signal_hook::low_level::raise;

#[derive(Default)]
struct StopCounter {
    stops: AtomicUsize,
}

impl StopCounter {
    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Runner for StopCounter {
    fn id(&self) -> &str {
        "stop-counter"
    }

    fn start(&self) -> Result<(), RunnerError> {
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Test 1: A configured signal stops the runner exactly once
// ============================================================================

#[test]
fn signal_stops_runner() {
    let runner = Arc::new(StopCounter::default());
    let controller = ShutdownController::new(
        Arc::clone(&runner),
        ShutdownConfig::default().with_signals([SIGUSR1]),
    )
    .unwrap();

    raise(SIGUSR1).unwrap();
    controller.run().unwrap();

    assert!(controller.is_stopped());
    assert_eq!(runner.stops(), 1);

    drop(controller);
    assert_eq!(runner.stops(), 1);
}

// ============================================================================
// Test 2: request_stop wakes the controller from another thread
// ============================================================================

#[test]
fn handle_requests_stop() {
    let runner = Arc::new(StopCounter::default());
    let controller = ShutdownController::new(
        Arc::clone(&runner),
        ShutdownConfig::default().with_signals([SIGUSR2]),
    )
    .unwrap();
    let handle = controller.handle();

    let requester = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.request_stop();
    });
    controller.run().unwrap();
    requester.join().unwrap();

    assert_eq!(runner.stops(), 1);
}

// ============================================================================
// Test 3: Dropping the controller stops the runner
// ============================================================================

#[test]
fn drop_stops_runner() {
    let runner = Arc::new(StopCounter::default());
    let controller = ShutdownController::new(
        Arc::clone(&runner),
        ShutdownConfig { signals: Vec::new() },
    )
    .unwrap();
    assert_eq!(runner.stops(), 0);

    drop(controller);

    assert_eq!(runner.stops(), 1);
}

// ============================================================================
// Test 4: Previously installed handlers still run
// ============================================================================

#[test]
fn earlier_handlers_still_fire() {
    let earlier = Arc::new(AtomicBool::new(false));
    let earlier_id = signal_hook::flag::register(SIGWINCH, Arc::clone(&earlier)).unwrap();
    let runner = Arc::new(StopCounter::default());
    let controller = ShutdownController::new(
        Arc::clone(&runner),
        ShutdownConfig::default().with_signals([SIGWINCH]),
    )
    .unwrap();

    raise(SIGWINCH).unwrap();
    controller.run().unwrap();

    assert!(earlier.load(Ordering::SeqCst));
    assert_eq!(runner.stops(), 1);
    signal_hook::low_level::unregister(earlier_id);
}
