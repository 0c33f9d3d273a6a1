//! Database plumbing shared by the storage backends.

mod error;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use error::{DbError, DbResult};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
#[cfg(feature = "sqlite")]
pub(crate) use sqlite::{decode_time, encode_time};
