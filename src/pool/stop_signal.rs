use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A cloneable stop flag that sleeping threads can wait on.
///
/// `stop()` wakes every thread blocked in [`StopSignal::wait_timeout`], so a
/// loop sleeping between iterations notices a shutdown immediately.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stop(&self) {
        *self.state() = true;
        self.inner.1.notify_all();
    }

    pub fn reset(&self) {
        *self.state() = false;
    }

    pub fn is_stopped(&self) -> bool {
        *self.state()
    }

    /// Block for up to `timeout`. Returns `true` if stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.state();
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = match self.inner.1.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *stopped
    }
}
