//! Generic repository operations addressed by entity name.

use anyhow::Context as _;
use scd_core::{catalog::Workforce, predicate::Predicate, row::Payload, store::VersionStore};
use serde_json::Value;

use super::parse_assignment;

/// Latest rows of `entity`, optionally filtered by `field=value` equalities.
pub async fn latest<S: VersionStore>(
  workforce: &Workforce<S>,
  entity: &str,
  filters: &[String],
) -> anyhow::Result<Value> {
  let repository = workforce.repository(entity)?;
  let predicate = filters
    .iter()
    .map(|f| parse_assignment(f).map(|(field, value)| Predicate::eq(&field, value)))
    .collect::<anyhow::Result<Vec<_>>>()?;
  let rows = repository
    .get_latest_where(&Predicate::all(predicate))
    .await
    .with_context(|| format!("querying latest {entity} rows"))?;
  Ok(serde_json::to_value(rows)?)
}

pub async fn history<S: VersionStore>(
  workforce: &Workforce<S>,
  entity: &str,
  logical_id: &str,
) -> anyhow::Result<Value> {
  let rows = workforce
    .repository(entity)?
    .get_history(logical_id)
    .await
    .with_context(|| format!("reading history of {entity} {logical_id}"))?;
  Ok(serde_json::to_value(rows)?)
}

/// Append a new version of `logical_id` with the given `field=value` changes.
pub async fn update<S: VersionStore>(
  workforce: &Workforce<S>,
  entity: &str,
  logical_id: &str,
  assignments: &[String],
) -> anyhow::Result<Value> {
  let changes = assignments
    .iter()
    .map(|a| parse_assignment(a))
    .collect::<anyhow::Result<Payload>>()?;
  let row = workforce
    .repository(entity)?
    .update(logical_id, changes)
    .await
    .with_context(|| format!("updating {entity} {logical_id}"))?;
  tracing::info!(entity, logical_id, version = row.version, "appended version");
  Ok(serde_json::to_value(row)?)
}
