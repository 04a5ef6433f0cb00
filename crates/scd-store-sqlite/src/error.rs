//! Error type for `scd-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row does not decode into a valid [`scd_core::row::Row`].
  /// `key` is the row's uid, or its logical id where only that is known.
  #[error("corrupt row {key}: {reason}")]
  CorruptRow { key: String, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self { Self::Database(err.into()) }
}

/// Attach the failing store operation when handing an error to the core
/// crate.
pub(crate) trait StorageContext<T> {
  fn context(self, operation: &'static str) -> scd_core::Result<T>;
}

impl<T, E: Into<Error>> StorageContext<T> for Result<T, E> {
  fn context(self, operation: &'static str) -> scd_core::Result<T> {
    self.map_err(|e| scd_core::Error::storage(operation, e.into()))
  }
}
