use std::io::{self, Read, Write};
use std::os::raw::c_int;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{FORBIDDEN, SIGINT, SIGTERM};
use signal_hook::low_level::{self, pipe};
use signal_hook::{flag, SigId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::Runner;

#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("signal handling I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("signal {0} cannot be used for shutdown")]
    UnsupportedSignal(c_int),
}

/// Signals that trigger an orderly stop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownConfig {
    pub signals: Vec<c_int>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            signals: vec![SIGINT, SIGTERM],
        }
    }
}

impl ShutdownConfig {
    pub fn with_signals(mut self, signals: impl IntoIterator<Item = c_int>) -> Self {
        self.signals = signals.into_iter().collect();
        self
    }
}

fn install(
    flags: &[(c_int, Arc<AtomicBool>)],
    writer: &UnixStream,
    handlers: &mut Vec<SigId>,
) -> Result<(), ShutdownError> {
    for (signal, fired) in flags {
        handlers.push(flag::register(*signal, Arc::clone(fired))?);
        handlers.push(pipe::register(*signal, writer.try_clone()?)?);
    }
    Ok(())
}

fn describe(signal: c_int) -> String {
    low_level::signal_name(signal)
        .map(String::from)
        .unwrap_or_else(|| signal.to_string())
}

/// Turns termination signals into a single `stop()` on a runner.
///
/// The installed signal handlers only set a per-signal flag and write one byte
/// to a socket pair. Everything else, logging and the `stop()` call
/// included, happens on the thread blocked in [`ShutdownController::run`].
/// Handlers chain to whatever was installed before them.
///
/// Dropping the controller calls `stop()` if it has not happened yet and
/// unregisters the handlers, so unwinding out of `main` still stops the
/// runner.
pub struct ShutdownController<R: Runner> {
    runner: R,
    flags: Vec<(c_int, Arc<AtomicBool>)>,
    requested: Arc<AtomicBool>,
    reader: UnixStream,
    writer: Arc<UnixStream>,
    handlers: Vec<SigId>,
    stopped: AtomicBool,
}

impl<R: Runner> ShutdownController<R> {
    /// Install handlers for the configured signals.
    pub fn new(runner: R, config: ShutdownConfig) -> Result<Self, ShutdownError> {
        for &signal in &config.signals {
            if signal <= 0 || FORBIDDEN.contains(&signal) {
                return Err(ShutdownError::UnsupportedSignal(signal));
            }
        }

        let (reader, writer) = UnixStream::pair()?;
        writer.set_nonblocking(true)?;
        let flags: Vec<_> = config
            .signals
            .iter()
            .map(|&signal| (signal, Arc::new(AtomicBool::new(false))))
            .collect();

        let mut handlers = Vec::with_capacity(flags.len() * 2);
        if let Err(err) = install(&flags, &writer, &mut handlers) {
            for id in handlers {
                low_level::unregister(id);
            }
            return Err(err);
        }

        let controller = ShutdownController {
            runner,
            flags,
            requested: Arc::new(AtomicBool::new(false)),
            reader,
            writer: Arc::new(writer),
            handlers,
            stopped: AtomicBool::new(false),
        };
        debug!(
            signals = ?controller.flags.iter().map(|(s, _)| describe(*s)).collect::<Vec<_>>(),
            "Shutdown handlers installed"
        );

        Ok(controller)
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// A handle that can trigger the same shutdown from ordinary code.
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            requested: Arc::clone(&self.requested),
            writer: Arc::clone(&self.writer),
        }
    }

    /// Whether `stop()` has been called on the runner.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Block until a termination signal or a stop request arrives, then stop
    /// the runner.
    pub fn run(&self) -> Result<(), ShutdownError> {
        let mut buf = [0u8; 64];

        while !self.is_stopped() {
            match (&self.reader).read(&mut buf) {
                Ok(0) => {
                    warn!("Shutdown pipe closed");
                    break;
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }

            let requested = self.requested.swap(false, Ordering::SeqCst);
            let fired: Vec<c_int> = self
                .flags
                .iter()
                .filter(|(_, fired)| fired.swap(false, Ordering::SeqCst))
                .map(|(signal, _)| *signal)
                .collect();
            if !requested && fired.is_empty() {
                debug!("Woken without a termination signal");
                continue;
            }

            if requested {
                info!("Shutdown requested");
            }
            for signal in fired {
                info!(signal = %describe(signal), "Received termination signal");
            }
            self.stop_runner();
        }
        Ok(())
    }

    fn stop_runner(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(runner = %self.runner.id(), "Stopping runner");
        self.runner.stop();
    }
}

impl<R: Runner> Drop for ShutdownController<R> {
    fn drop(&mut self) {
        self.stop_runner();
        for id in self.handlers.drain(..) {
            low_level::unregister(id);
        }
    }
}

/// Requests shutdown of a [`ShutdownController`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    writer: Arc<UnixStream>,
}

impl ShutdownHandle {
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        match (&*self.writer).write(&[1]) {
            Ok(_) => {}
            // A full buffer already holds a pending wake-up.
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => warn!(error = %err, "Could not wake shutdown controller"),
        }
    }
}
