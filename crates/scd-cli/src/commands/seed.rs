//! Deterministic sample data: companies, contractors, jobs with several
//! versions, timelogs pinned to job versions, and payment line items.
//!
//! Re-running is safe: entities whose logical id already exists are left
//! alone.

use anyhow::Context as _;
use chrono::{Duration, Utc};
use scd_core::{
  ErrorKind,
  catalog::{JOB_STATUSES, PAYMENT_STATUSES, TIMELOG_TYPES, Workforce},
  repository::Repository,
  row::{Payload, Row, encode_timestamp},
  store::VersionStore,
};
use serde_json::{Value, json};

const JOB_TITLES: [&str; 10] = [
  "Software Engineer",
  "Senior Developer",
  "DevOps Engineer",
  "Data Scientist",
  "Product Manager",
  "UI/UX Designer",
  "Machine Learning Engineer",
  "Full Stack Developer",
  "Backend Developer",
  "Frontend Developer",
];

const MS_PER_HOUR: i64 = 3_600_000;

#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
  pub companies:   u32,
  pub contractors: u32,
  pub jobs:        u32,
  /// Upper bound on versions per job.
  pub versions:    u32,
}

fn payload(v: Value) -> Payload {
  match v {
    Value::Object(map) => map,
    _ => Payload::new(),
  }
}

/// Create `logical_id` unless it already exists; either way return its latest
/// row and whether it was created now.
async fn create_once<S: VersionStore>(
  repository: &Repository<S>,
  logical_id: &str,
  initial: Payload,
) -> anyhow::Result<(Row, bool)> {
  match repository.create(initial, Some(logical_id)).await {
    Ok(row) => Ok((row, true)),
    Err(e) if e.kind() == ErrorKind::DuplicateEntity => {
      tracing::debug!(entity = repository.entity(), logical_id, "already exists, skipping");
      Ok((repository.get_latest(logical_id).await?, false))
    }
    Err(e) => Err(e).with_context(|| format!("creating {} {logical_id}", repository.entity())),
  }
}

pub async fn seed<S: VersionStore>(
  workforce: &Workforce<S>,
  options: SeedOptions,
) -> anyhow::Result<Value> {
  let companies = options.companies.max(1);
  let contractors = options.contractors.max(1);
  let versions = options.versions.max(1);
  let now = Utc::now();

  let mut jobs = Vec::new();
  let mut created = [0usize; 3];

  // ── Jobs ──────────────────────────────────────────────────────────────────
  for i in 0..options.jobs {
    let logical_id = format!("job_{:03}", i + 1);
    let initial = payload(json!({
      "title": JOB_TITLES[i as usize % JOB_TITLES.len()],
      "status": "active",
      "rate": 20.0 + f64::from((i * 37) % 3_000) / 100.0,
      "description": format!("Description for job {}", i + 1),
      "company_id": format!("comp_{:03}", i % companies + 1),
      "contractor_id": format!("cont_{:03}", (i * 3 + 1) % contractors + 1),
    }));
    let (mut job, fresh) = create_once(&workforce.jobs, &logical_id, initial).await?;
    if fresh {
      created[0] += 1;
      for v in 1..(1 + i % versions) {
        let mut changes = Payload::new();
        changes.insert("rate".into(), json!(20.0 + f64::from((i * 13 + v * 7) % 4_000) / 100.0));
        if (i + v) % 3 == 0 {
          let status = JOB_STATUSES[((i + v) % 4) as usize];
          changes.insert("status".into(), json!(status));
        }
        job = workforce.jobs.update(&logical_id, changes).await?;
      }
    }
    jobs.push(job);
  }

  // ── Timelogs ──────────────────────────────────────────────────────────────
  let mut timelogs = Vec::new();
  for (i, job) in jobs.iter().enumerate() {
    for t in 0..(2 + i % 4) {
      let logical_id = format!("timelog_{:03}_{:02}", i + 1, t + 1);
      let hours = 1 + ((i + t) % 8) as i64;
      let start = (now - Duration::days(((i * 3 + t) % 28) as i64 + 1)).timestamp_millis();
      let initial = payload(json!({
        "duration": hours * MS_PER_HOUR,
        "time_start": start,
        "time_end": start + hours * MS_PER_HOUR,
        "type": TIMELOG_TYPES[(i + t) % TIMELOG_TYPES.len()],
        "description": format!("Work on {}", job.logical_id),
        "job_uid": job.uid,
      }));
      let (mut timelog, fresh) = create_once(&workforce.timelogs, &logical_id, initial).await?;
      if fresh {
        created[1] += 1;
        if (i + t) % 5 == 0 && versions > 1 {
          let adjusted = (hours * MS_PER_HOUR) - MS_PER_HOUR / 2;
          timelog = workforce
            .timelogs
            .update(
              &logical_id,
              payload(json!({
                "duration": adjusted,
                "time_end": start + adjusted,
                "type": "adjusted",
              })),
            )
            .await?;
        }
      }
      timelogs.push((job, timelog));
    }
  }

  // ── Payment line items ────────────────────────────────────────────────────
  for (n, (job, timelog)) in timelogs.iter().enumerate() {
    let logical_id = format!("payment_{:04}", n + 1);
    let hours = timelog.f64_field("duration").unwrap_or(0.0) / MS_PER_HOUR as f64;
    let rate = job.f64_field("rate").unwrap_or(0.0);
    let amount = (hours * rate * 100.0).round() / 100.0;
    let initial = payload(json!({
      "amount": amount,
      "notes": format!("Payment for {}", timelog.logical_id),
      "job_uid": job.uid,
      "timelog_uid": timelog.uid,
    }));
    let (_, fresh) = create_once(&workforce.payment_line_items, &logical_id, initial).await?;
    if !fresh {
      continue;
    }
    created[2] += 1;

    // Only `not-paid`, `paid`, `pending` and `failed` occur in sample data.
    let status = PAYMENT_STATUSES[n % 4];
    if status == "not-paid" {
      continue;
    }
    let mut changes = payload(json!({ "status": status }));
    if status == "paid" {
      let paid_at = now - Duration::days((n % 60) as i64);
      changes.insert("payment_date".into(), json!(encode_timestamp(paid_at)));
    }
    workforce.payment_line_items.update(&logical_id, changes).await?;
  }

  tracing::info!(
    jobs = created[0],
    timelogs = created[1],
    payment_line_items = created[2],
    "seeded sample data"
  );

  let mut summary = serde_json::Map::new();
  for (repository, fresh) in [
    (&workforce.jobs, created[0]),
    (&workforce.timelogs, created[1]),
    (&workforce.payment_line_items, created[2]),
  ] {
    let latest = repository.latest_map(None).await?;
    let rows: u64 = latest.values().map(|v| u64::from(*v)).sum();
    summary.insert(
      repository.entity().to_owned(),
      json!({ "created": fresh, "entities": latest.len(), "rows": rows }),
    );
  }
  Ok(Value::Object(summary))
}
