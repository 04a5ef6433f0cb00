//! Error types for `scd-core`.

use thiserror::Error;

/// Coarse classification of an [`Error`], for callers deciding whether to
/// retry at a higher level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  DuplicateEntity,
  ConcurrencyConflict,
  Validation,
  Storage,
}

#[derive(Debug, Error)]
pub enum Error {
  /// No row exists for the requested key. `key` is a logical id or, for
  /// pinned references, a uid.
  #[error("{entity} not found: {key}")]
  NotFound { entity: String, key: String },

  #[error("{entity} {logical_id} already exists")]
  DuplicateEntity { entity: String, logical_id: String },

  /// Version allocation lost the race on every attempt the retry policy
  /// allowed.
  #[error(
    "version conflict on {entity} {logical_id}: gave up after {attempts} \
     attempt(s)"
  )]
  ConcurrencyConflict {
    entity:     String,
    logical_id: String,
    attempts:   u32,
  },

  #[error("invalid {entity}.{field}: {reason}")]
  Validation {
    entity: String,
    field:  String,
    reason: String,
  },

  #[error("storage error during {operation}: {source}")]
  Storage {
    operation: &'static str,
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
  },
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::DuplicateEntity { .. } => ErrorKind::DuplicateEntity,
      Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
      Self::Validation { .. } => ErrorKind::Validation,
      Self::Storage { .. } => ErrorKind::Storage,
    }
  }

  pub fn not_found(entity: &str, key: impl Into<String>) -> Self {
    Self::NotFound { entity: entity.to_owned(), key: key.into() }
  }

  pub fn validation(
    entity: &str,
    field: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self::Validation {
      entity: entity.to_owned(),
      field:  field.into(),
      reason: reason.into(),
    }
  }

  /// Wrap a backend failure with the name of the operation that hit it.
  pub fn storage<E>(operation: &'static str, source: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage { operation, source: Box::new(source) }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
