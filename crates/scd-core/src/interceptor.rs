//! Middleware wrapped around every repository call.
//!
//! The [`Repository`](crate::repository::Repository) announces each call to
//! its [`Interceptor`] before running it and reports the outcome and elapsed
//! time afterwards. Logging and timing live here instead of on individual
//! operations.

use std::time::Duration;

use crate::Error;

/// The repository operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  GetLatest,
  GetLatestWhere,
  GetLatestMany,
  LatestMap,
  GetHistory,
  GetVersion,
  GetByUid,
  Create,
  Update,
}

impl Operation {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::GetLatest => "get_latest",
      Self::GetLatestWhere => "get_latest_where",
      Self::GetLatestMany => "get_latest_many",
      Self::LatestMap => "latest_map",
      Self::GetHistory => "get_history",
      Self::GetVersion => "get_version",
      Self::GetByUid => "get_by_uid",
      Self::Create => "create",
      Self::Update => "update",
    }
  }

  pub fn is_write(self) -> bool { matches!(self, Self::Create | Self::Update) }
}

/// Identifies one repository call.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
  pub entity:    &'a str,
  pub operation: Operation,
  /// The logical id (or uid, for [`Operation::GetByUid`]) the call is about,
  /// when there is one.
  pub key:       Option<&'a str>,
}

pub trait Interceptor: Send + Sync {
  fn before(&self, _call: &Call<'_>) {}

  fn after(&self, call: &Call<'_>, outcome: Result<(), &Error>, elapsed: Duration);
}

// ─── Default ─────────────────────────────────────────────────────────────────

/// Emits one `tracing` event per completed call. Failed writes and storage
/// errors log at `warn`; everything else at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

impl Interceptor for TracingInterceptor {
  fn after(&self, call: &Call<'_>, outcome: Result<(), &Error>, elapsed: Duration) {
    let op = call.operation.as_str();
    let key = call.key.unwrap_or("-");
    let elapsed_us = elapsed.as_micros() as u64;
    match outcome {
      Ok(()) => {
        tracing::debug!(entity = call.entity, op, key, elapsed_us, "ok");
      }
      Err(err) if call.operation.is_write() || matches!(err, Error::Storage { .. }) => {
        tracing::warn!(entity = call.entity, op, key, elapsed_us, kind = ?err.kind(), "{err}");
      }
      Err(err) => {
        tracing::debug!(entity = call.entity, op, key, elapsed_us, kind = ?err.kind(), "{err}");
      }
    }
  }
}

/// Does nothing; for callers that want no per-call overhead at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterceptor;

impl Interceptor for NoopInterceptor {
  fn after(&self, _: &Call<'_>, _: Result<(), &Error>, _: Duration) {}
}
