//! Latest-version resolution.
//!
//! "Latest" is computed in two steps: one aggregate pass yields
//! `logical_id → max(version)`, and that mapping is joined back against the
//! rows on the compound key `(logical_id, version)`. Filters are applied only
//! after this join, so a predicate on a mutable field can never match a
//! superseded version whose old value happened to satisfy it.
//!
//! Selecting latest rows with one `(id = x AND version = n)` disjunct per
//! logical id is never done here; the cost of resolution scales with the
//! number of rows, not rows × ids.

use std::collections::{HashMap, HashSet};

use crate::{
  Error, Result,
  descriptor::VersionDescriptor,
  predicate::Predicate,
  row::Row,
  store::{LatestMap, VersionStore},
};

// ─── Store-backed resolver ───────────────────────────────────────────────────

/// Read-side helper over a [`VersionStore`] for one entity type.
pub struct Resolver<'s, S> {
  store:      &'s S,
  descriptor: &'s VersionDescriptor,
}

impl<'s, S: VersionStore> Resolver<'s, S> {
  pub fn new(store: &'s S, descriptor: &'s VersionDescriptor) -> Self {
    Self { store, descriptor }
  }

  /// `logical_id → max(version)`, optionally restricted to `ids`.
  pub async fn latest_map(&self, ids: Option<&[String]>) -> Result<LatestMap> {
    self.store.max_versions(self.descriptor, ids).await
  }

  /// Latest rows satisfying `predicate`. The predicate is validated and
  /// normalized against the descriptor before it reaches the store.
  pub async fn latest_where(&self, predicate: &Predicate) -> Result<Vec<Row>> {
    let predicate = predicate.normalize(self.descriptor)?;
    self
      .store
      .latest_rows(self.descriptor, None, Some(&predicate))
      .await
  }

  /// Latest rows for `ids`; ids with no rows are absent from the result.
  pub async fn latest_many(&self, ids: &[String]) -> Result<Vec<Row>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    self.store.latest_rows(self.descriptor, Some(ids), None).await
  }

  pub async fn latest_one(&self, logical_id: &str) -> Result<Option<Row>> {
    let ids = [logical_id.to_owned()];
    let rows = self.store.latest_rows(self.descriptor, Some(&ids[..]), None).await?;
    Ok(rows.into_iter().next())
  }

  /// Like [`Self::latest_one`], but absence is an error.
  pub async fn require_latest(&self, logical_id: &str) -> Result<Row> {
    self
      .latest_one(logical_id)
      .await?
      .ok_or_else(|| Error::not_found(self.descriptor.entity(), logical_id))
  }
}

// ─── In-memory algorithm ─────────────────────────────────────────────────────

/// Aggregate step: one pass over `rows`, keeping the highest version seen for
/// each logical id (optionally only those in `ids`).
pub fn max_versions<'r>(
  rows: impl IntoIterator<Item = &'r Row>,
  ids: Option<&[String]>,
) -> LatestMap {
  let wanted: Option<HashSet<&str>> =
    ids.map(|ids| ids.iter().map(String::as_str).collect());
  let mut latest = LatestMap::new();
  for row in rows {
    if wanted.as_ref().is_some_and(|w| !w.contains(row.logical_id.as_str())) {
      continue;
    }
    latest
      .entry(row.logical_id.clone())
      .and_modify(|v| *v = (*v).max(row.version))
      .or_insert(row.version);
  }
  latest
}

/// Join step: keep rows whose `(logical_id, version)` is in `latest`, then
/// apply `filter` to those rows only. Output is ordered by logical id.
pub fn join_latest<'r>(
  rows: impl IntoIterator<Item = &'r Row>,
  latest: &LatestMap,
  filter: Option<&Predicate>,
) -> Vec<Row> {
  let mut by_key: HashMap<(&str, u32), &Row> = HashMap::new();
  for row in rows {
    by_key.insert((row.logical_id.as_str(), row.version), row);
  }
  latest
    .iter()
    .filter_map(|(id, version)| by_key.get(&(id.as_str(), *version)).copied())
    .filter(|row| filter.is_none_or(|p| p.matches(row)))
    .cloned()
    .collect()
}
