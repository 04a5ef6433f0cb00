//! Contractor and company reports.

use anyhow::Context as _;
use chrono::{Duration, Utc};
use scd_core::{catalog::Workforce, store::VersionStore};
use serde_json::Value;

/// The contractor dashboard over the last `days` days.
pub async fn dashboard<S: VersionStore>(
  workforce: &Workforce<S>,
  contractor_id: &str,
  days: u32,
) -> anyhow::Result<Value> {
  let until = Utc::now();
  let since = until - Duration::days(i64::from(days));
  let dash = workforce
    .contractor_dashboard(contractor_id, since, until)
    .await
    .with_context(|| format!("building dashboard for {contractor_id}"))?;
  Ok(serde_json::to_value(dash)?)
}

pub async fn spending<S: VersionStore>(
  workforce: &Workforce<S>,
  company_id: &str,
  year: i32,
  month: u32,
) -> anyhow::Result<Value> {
  let report = workforce
    .company_spending(company_id, year, month)
    .await
    .with_context(|| format!("building spending report for {company_id}"))?;
  Ok(serde_json::to_value(report)?)
}
