//! The `VersionStore` trait, the storage seam.
//!
//! Implemented by storage backends (`scd-store-sqlite`, and
//! [`MemoryStore`](crate::memory::MemoryStore) for tests and embedding). The
//! repository layer depends on this abstraction only.
//!
//! A backend is a valid store only if [`VersionStore::insert`] rejects a
//! duplicate `(logical_id, version)` or `uid` atomically: version allocation
//! relies on that check and nothing else.

use std::{collections::BTreeMap, future::Future};

use crate::{Result, descriptor::VersionDescriptor, predicate::Predicate, row::Row};

/// `logical_id → max(version)`.
pub type LatestMap = BTreeMap<String, u32>;

/// What happened to an attempted insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
  Inserted,
  /// Another row already holds this `(logical_id, version)`.
  VersionTaken,
  /// Another row already holds this `uid`.
  UidTaken,
}

/// Abstraction over a versioned-row storage engine.
///
/// Backend failures are reported as [`Error::Storage`](crate::Error::Storage)
/// carrying the operation name. All methods return `Send` futures so the trait
/// can be used from multi-threaded runtimes.
pub trait VersionStore: Send + Sync {
  /// Insert `row`, or report which uniqueness constraint rejected it.
  fn insert(
    &self,
    descriptor: &VersionDescriptor,
    row: &Row,
  ) -> impl Future<Output = Result<InsertOutcome>> + Send;

  /// One aggregate pass: the highest version of every logical id, optionally
  /// restricted to `ids`. Unknown ids are simply absent.
  fn max_versions(
    &self,
    descriptor: &VersionDescriptor,
    ids: Option<&[String]>,
  ) -> impl Future<Output = Result<LatestMap>> + Send;

  /// The latest row of every logical id (optionally only `ids`), obtained by
  /// joining the max-version aggregate back on `(logical_id, version)`, with
  /// `filter` applied to those latest rows only. Ordered by `logical_id`.
  fn latest_rows(
    &self,
    descriptor: &VersionDescriptor,
    ids: Option<&[String]>,
    filter: Option<&Predicate>,
  ) -> impl Future<Output = Result<Vec<Row>>> + Send;

  /// Every version of `logical_id`, ascending.
  fn history(
    &self,
    descriptor: &VersionDescriptor,
    logical_id: &str,
  ) -> impl Future<Output = Result<Vec<Row>>> + Send;

  /// Rows with any of the given uids, in no particular order.
  fn rows_by_uid(
    &self,
    descriptor: &VersionDescriptor,
    uids: &[String],
  ) -> impl Future<Output = Result<Vec<Row>>> + Send;

  fn row_at_version(
    &self,
    descriptor: &VersionDescriptor,
    logical_id: &str,
    version: u32,
  ) -> impl Future<Output = Result<Option<Row>>> + Send;
}
