use thiserror::Error;

use crate::db::DbError;
use crate::error::ConfigError;

use super::publisher::PublishError;

/// Error raised while relaying a topic.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The broker refused the batch for its size. Its rows were deleted.
    #[error("batch of {rows} messages for topic {topic} was too large and has been discarded: {source}")]
    BatchTooLarge {
        topic: String,
        rows: usize,
        #[source]
        source: PublishError,
    },

    /// Published rows could not be deleted; they will be published again.
    #[error("could not delete published messages for topic {topic} after {attempts} attempts: {source}")]
    DeleteRetryExhausted {
        topic: String,
        attempts: u32,
        #[source]
        source: DbError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
