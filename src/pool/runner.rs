use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::db::DbError;
use crate::error::ConfigError;
use crate::relay::RelayError;

/// Why a runner's `start()` returned early.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("runner error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl RunnerError {
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        RunnerError::Other(err.into())
    }
}

/// A long-lived loop supervised by a [`WorkerPool`](super::WorkerPool).
///
/// `start` runs the loop on the calling thread until the runner decides to
/// finish or `stop` is called from another thread. An `Err` from `start` is a
/// crash: the pool backs off and calls `start` again. Stopping is cooperative
/// and takes effect between iterations; a stopped runner stays stopped.
pub trait Runner: Send + Sync {
    fn id(&self) -> &str;

    fn start(&self) -> Result<(), RunnerError>;

    fn stop(&self);
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn start(&self) -> Result<(), RunnerError> {
        (**self).start()
    }

    fn stop(&self) {
        (**self).stop()
    }
}
