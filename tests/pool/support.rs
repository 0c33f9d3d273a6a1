//! Scripted runners for pool tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use outbox_relay::{Runner, RunnerError, StopSignal};

/// Poll `condition` for up to five seconds.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

enum Script {
    /// Block until stopped.
    Run,
    /// Return `Ok` immediately.
    Finish,
    Panic,
}

/// A runner that fails a set number of starts, then follows its script.
pub struct ScriptedRunner {
    id: String,
    script: Script,
    failures_left: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    running: AtomicBool,
    stop_signal: StopSignal,
}

impl ScriptedRunner {
    fn with_script(id: &str, script: Script, failures: usize) -> Self {
        ScriptedRunner {
            id: id.to_string(),
            script,
            failures_left: AtomicUsize::new(failures),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            stop_signal: StopSignal::new(),
        }
    }

    pub fn new(id: &str) -> Self {
        Self::with_script(id, Script::Run, 0)
    }

    pub fn failing(id: &str, failures: usize) -> Self {
        Self::with_script(id, Script::Run, failures)
    }

    pub fn finishing(id: &str) -> Self {
        Self::with_script(id, Script::Finish, 0)
    }

    pub fn panicking(id: &str) -> Self {
        Self::with_script(id, Script::Panic, 0)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Runner for ScriptedRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn start(&self) -> Result<(), RunnerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RunnerError::other(format!("{} crashed", self.id)));
        }

        match self.script {
            Script::Finish => Ok(()),
            Script::Panic => panic!("{} panicked", self.id),
            Script::Run => {
                self.running.store(true, Ordering::SeqCst);
                while !self.stop_signal.wait_timeout(Duration::from_secs(1)) {}
                self.running.store(false, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stop_signal.stop();
    }
}
