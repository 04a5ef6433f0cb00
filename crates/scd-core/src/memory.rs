//! [`MemoryStore`]: a process-local [`VersionStore`].
//!
//! Rows live in per-table vectors behind one mutex. Each store primitive holds
//! the lock for its own duration only, which gives `insert` the atomic
//! uniqueness check the controller relies on and nothing more.

use std::{
  collections::{HashMap, HashSet},
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
  Result,
  descriptor::VersionDescriptor,
  predicate::Predicate,
  resolver::{join_latest, max_versions},
  row::Row,
  store::{InsertOutcome, LatestMap, VersionStore},
};

#[derive(Default)]
struct Table {
  rows:    Vec<Row>,
  uids:    HashSet<String>,
  /// `(logical_id, version)` pairs already taken.
  keys:    HashSet<(String, u32)>,
}

#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<HashMap<String, Table>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Table>> {
    // A panic elsewhere cannot leave a table half-written: every mutation is a
    // single push after all checks have passed.
    self.tables.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Total stored rows for `descriptor`, across all versions.
  pub fn row_count(&self, descriptor: &VersionDescriptor) -> usize {
    self
      .lock()
      .get(descriptor.table())
      .map_or(0, |t| t.rows.len())
  }
}

impl VersionStore for MemoryStore {
  async fn insert(
    &self,
    descriptor: &VersionDescriptor,
    row: &Row,
  ) -> Result<InsertOutcome> {
    let mut tables = self.lock();
    let table = tables.entry(descriptor.table().to_owned()).or_default();

    if table.uids.contains(&row.uid) {
      return Ok(InsertOutcome::UidTaken);
    }
    let key = (row.logical_id.clone(), row.version);
    if table.keys.contains(&key) {
      return Ok(InsertOutcome::VersionTaken);
    }

    table.uids.insert(row.uid.clone());
    table.keys.insert(key);
    table.rows.push(row.clone());
    Ok(InsertOutcome::Inserted)
  }

  async fn max_versions(
    &self,
    descriptor: &VersionDescriptor,
    ids: Option<&[String]>,
  ) -> Result<LatestMap> {
    let tables = self.lock();
    Ok(
      tables
        .get(descriptor.table())
        .map(|t| max_versions(&t.rows, ids))
        .unwrap_or_default(),
    )
  }

  async fn latest_rows(
    &self,
    descriptor: &VersionDescriptor,
    ids: Option<&[String]>,
    filter: Option<&Predicate>,
  ) -> Result<Vec<Row>> {
    let tables = self.lock();
    let Some(table) = tables.get(descriptor.table()) else {
      return Ok(Vec::new());
    };
    let latest = max_versions(&table.rows, ids);
    Ok(join_latest(&table.rows, &latest, filter))
  }

  async fn history(
    &self,
    descriptor: &VersionDescriptor,
    logical_id: &str,
  ) -> Result<Vec<Row>> {
    let tables = self.lock();
    let mut rows: Vec<Row> = tables
      .get(descriptor.table())
      .map(|t| {
        t.rows
          .iter()
          .filter(|r| r.logical_id == logical_id)
          .cloned()
          .collect()
      })
      .unwrap_or_default();
    rows.sort_by_key(|r| r.version);
    Ok(rows)
  }

  async fn rows_by_uid(
    &self,
    descriptor: &VersionDescriptor,
    uids: &[String],
  ) -> Result<Vec<Row>> {
    let wanted: HashSet<&str> = uids.iter().map(String::as_str).collect();
    let tables = self.lock();
    Ok(
      tables
        .get(descriptor.table())
        .map(|t| {
          t.rows
            .iter()
            .filter(|r| wanted.contains(r.uid.as_str()))
            .cloned()
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  async fn row_at_version(
    &self,
    descriptor: &VersionDescriptor,
    logical_id: &str,
    version: u32,
  ) -> Result<Option<Row>> {
    let tables = self.lock();
    Ok(tables.get(descriptor.table()).and_then(|t| {
      t.rows
        .iter()
        .find(|r| r.logical_id == logical_id && r.version == version)
        .cloned()
    }))
  }
}
