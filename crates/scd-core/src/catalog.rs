//! The contracting catalog: jobs, timelogs, and payment line items, and the
//! reporting queries built on them.
//!
//! Timelogs and payment line items pin the exact job (and timelog) version
//! they were recorded against. Queries "for a contractor" therefore walk from
//! the contractor's *current* jobs to the rows that reference those versions.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

use crate::{
  Error, Result,
  chain::{Chain, resolve_references},
  controller::RetryPolicy,
  descriptor::{Field, VersionDescriptor},
  interceptor::Interceptor,
  predicate::Predicate,
  repository::Repository,
  row::{Row, encode_timestamp},
  store::VersionStore,
};

pub const JOB_STATUSES: [&str; 5] =
  ["active", "extended", "paused", "completed", "cancelled"];
pub const TIMELOG_TYPES: [&str; 3] = ["captured", "adjusted", "manual"];
pub const PAYMENT_STATUSES: [&str; 5] =
  ["not-paid", "paid", "failed", "pending", "cancelled"];

const MS_PER_HOUR: f64 = 60.0 * 60.0 * 1000.0;

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// Descriptors for the three versioned entity types.
#[derive(Debug, Clone)]
pub struct Catalog {
  pub jobs:               Arc<VersionDescriptor>,
  pub timelogs:           Arc<VersionDescriptor>,
  pub payment_line_items: Arc<VersionDescriptor>,
}

impl Catalog {
  pub fn build() -> Result<Self> {
    let jobs = VersionDescriptor::builder("job", "scd_jobs")
      .field(
        Field::text("status")
          .queryable()
          .one_of(JOB_STATUSES)
          .default_value("active"),
      )
      .field(Field::decimal("rate"))
      .field(Field::text("title"))
      .field(Field::text("description").default_value(""))
      .field(Field::text("company_id").queryable().immutable())
      .field(Field::text("contractor_id").queryable().immutable())
      .build()?;

    let timelogs = VersionDescriptor::builder("timelog", "scd_timelogs")
      .field(Field::integer("duration"))
      .field(Field::integer("time_start").queryable())
      .field(Field::integer("time_end").queryable())
      .field(
        Field::text("type")
          .queryable()
          .one_of(TIMELOG_TYPES)
          .default_value("captured"),
      )
      .field(Field::text("description").default_value(""))
      .field(Field::reference("job_uid", &jobs))
      .build()?;

    let payment_line_items =
      VersionDescriptor::builder("payment_line_item", "scd_payment_line_items")
        .field(Field::decimal("amount"))
        .field(
          Field::text("status")
            .queryable()
            .one_of(PAYMENT_STATUSES)
            .default_value("not-paid"),
        )
        .field(Field::timestamp("payment_date").queryable().optional())
        .field(Field::text("notes").default_value(""))
        .field(Field::reference("job_uid", &jobs))
        .field(Field::reference("timelog_uid", &timelogs))
        .build()?;

    Ok(Self { jobs, timelogs, payment_line_items })
  }

  pub fn all(&self) -> [&Arc<VersionDescriptor>; 3] {
    [&self.jobs, &self.timelogs, &self.payment_line_items]
  }

  /// Look a descriptor up by entity name.
  pub fn get(&self, entity: &str) -> Option<&Arc<VersionDescriptor>> {
    self.all().into_iter().find(|d| d.entity() == entity)
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
  pub contractor_id: String,
  pub jobs:          Vec<Row>,
  pub timelogs:      Vec<Row>,
  pub payment_items: Vec<Row>,
  pub total_hours:   f64,
  pub total_amount:  f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendingReport {
  pub company_id:    String,
  /// `YYYY-MM`.
  pub period:        String,
  pub total_paid:    f64,
  pub payment_count: usize,
  /// Job logical id → amount paid against it.
  pub job_breakdown: BTreeMap<String, f64>,
}

// ─── Workforce ───────────────────────────────────────────────────────────────

/// Repositories for the whole catalog over one store, plus the standard
/// query patterns.
pub struct Workforce<S> {
  pub catalog:            Catalog,
  pub jobs:               Repository<S>,
  pub timelogs:           Repository<S>,
  pub payment_line_items: Repository<S>,
}

impl<S: VersionStore> Workforce<S> {
  pub fn new(store: Arc<S>, catalog: Catalog) -> Self {
    Self {
      jobs: Repository::new(Arc::clone(&store), Arc::clone(&catalog.jobs)),
      timelogs: Repository::new(Arc::clone(&store), Arc::clone(&catalog.timelogs)),
      payment_line_items: Repository::new(
        store,
        Arc::clone(&catalog.payment_line_items),
      ),
      catalog,
    }
  }

  pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
    Self {
      jobs: self.jobs.with_retry_policy(policy),
      timelogs: self.timelogs.with_retry_policy(policy),
      payment_line_items: self.payment_line_items.with_retry_policy(policy),
      catalog: self.catalog,
    }
  }

  pub fn with_interceptor(self, interceptor: Arc<dyn Interceptor>) -> Self {
    Self {
      jobs: self.jobs.with_interceptor(Arc::clone(&interceptor)),
      timelogs: self.timelogs.with_interceptor(Arc::clone(&interceptor)),
      payment_line_items: self.payment_line_items.with_interceptor(interceptor),
      catalog: self.catalog,
    }
  }

  /// The repository for `entity`, by name.
  pub fn repository(&self, entity: &str) -> Result<&Repository<S>> {
    [&self.jobs, &self.timelogs, &self.payment_line_items]
      .into_iter()
      .find(|r| r.entity() == entity)
      .ok_or_else(|| Error::validation(entity, "entity", "unknown entity type"))
  }

  pub async fn active_jobs_for_company(&self, company_id: &str) -> Result<Vec<Row>> {
    self
      .jobs
      .get_latest_where(&Predicate::all([
        Predicate::eq("company_id", company_id),
        Predicate::eq("status", "active"),
      ]))
      .await
  }

  pub async fn active_jobs_for_contractor(&self, contractor_id: &str) -> Result<Vec<Row>> {
    self
      .jobs
      .get_latest_where(&Predicate::all([
        Predicate::eq("contractor_id", contractor_id),
        Predicate::eq("status", "active"),
      ]))
      .await
  }

  /// Latest payment line items created in `[start, end]` that reference one
  /// of the contractor's latest jobs.
  pub async fn payment_items_for_contractor(
    &self,
    contractor_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<Row>> {
    Chain::from(&self.jobs, Predicate::eq("contractor_id", contractor_id))
      .then(
        &self.payment_line_items,
        "job_uid",
        Some(Predicate::created_between(start, end)),
      )
      .run()
      .await
  }

  /// Latest timelogs inside `[start_ms, end_ms]` (epoch milliseconds) that
  /// reference one of the contractor's latest jobs.
  pub async fn timelogs_for_contractor(
    &self,
    contractor_id: &str,
    start_ms: i64,
    end_ms: i64,
  ) -> Result<Vec<Row>> {
    Chain::from(&self.jobs, Predicate::eq("contractor_id", contractor_id))
      .then(
        &self.timelogs,
        "job_uid",
        Some(Predicate::all([
          Predicate::at_least("time_start", start_ms),
          Predicate::at_most("time_end", end_ms),
        ])),
      )
      .run()
      .await
  }

  /// Everything a contractor's overview needs for the window `[since, until]`.
  pub async fn contractor_dashboard(
    &self,
    contractor_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> Result<Dashboard> {
    let jobs = self
      .jobs
      .get_latest_where(&Predicate::eq("contractor_id", contractor_id))
      .await?;
    let job_uids: Vec<String> = jobs.iter().map(|j| j.uid.clone()).collect();

    let (timelogs, payment_items) = if job_uids.is_empty() {
      (Vec::new(), Vec::new())
    } else {
      let timelogs = self
        .timelogs
        .get_latest_where(&Predicate::all([
          Predicate::reference_in("job_uid", job_uids.iter().cloned()),
          Predicate::at_least("time_start", since.timestamp_millis()),
          Predicate::at_most("time_end", until.timestamp_millis()),
        ]))
        .await?;
      let payment_items = self
        .payment_line_items
        .get_latest_where(&Predicate::all([
          Predicate::reference_in("job_uid", job_uids),
          Predicate::created_between(since, until),
        ]))
        .await?;
      (timelogs, payment_items)
    };

    let total_ms: f64 = timelogs
      .iter()
      .filter_map(|t| t.f64_field("duration"))
      .sum();
    let total_amount: f64 = payment_items
      .iter()
      .filter_map(|p| p.f64_field("amount"))
      .sum();

    Ok(Dashboard {
      contractor_id: contractor_id.to_owned(),
      jobs,
      timelogs,
      payment_items,
      total_hours: round_cents(total_ms / MS_PER_HOUR),
      total_amount: round_cents(total_amount),
    })
  }

  /// Paid line items against the company's latest jobs whose `payment_date`
  /// falls in the given calendar month.
  pub async fn company_spending(
    &self,
    company_id: &str,
    year: i32,
    month: u32,
  ) -> Result<SpendingReport> {
    let (start, end) = month_bounds(year, month).ok_or_else(|| {
      Error::validation("payment_line_item", "payment_date", format!("no such month {year}-{month}"))
    })?;

    let items = Chain::from(&self.jobs, Predicate::eq("company_id", company_id))
      .then(
        &self.payment_line_items,
        "job_uid",
        Some(Predicate::all([
          Predicate::eq("status", "paid"),
          Predicate::range(
            "payment_date",
            std::ops::Bound::Included(encode_timestamp(start).into()),
            std::ops::Bound::Excluded(encode_timestamp(end).into()),
          ),
        ])),
      )
      .run()
      .await?;

    let jobs_by_uid = resolve_references(&items, "job_uid", &self.jobs).await?;
    let mut job_breakdown: BTreeMap<String, f64> = BTreeMap::new();
    for item in &items {
      let amount = item.f64_field("amount").unwrap_or(0.0);
      let job_id = item
        .str_field("job_uid")
        .and_then(|uid| jobs_by_uid.get(uid))
        .map(|job| job.logical_id.clone())
        .unwrap_or_default();
      *job_breakdown.entry(job_id).or_default() += amount;
    }
    for total in job_breakdown.values_mut() {
      *total = round_cents(*total);
    }

    Ok(SpendingReport {
      company_id: company_id.to_owned(),
      period: format!("{year}-{month:02}"),
      total_paid: round_cents(items.iter().filter_map(|i| i.f64_field("amount")).sum()),
      payment_count: items.len(),
      job_breakdown,
    })
  }
}

/// `[first instant of the month, first instant of the next month)`.
fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
  let first = NaiveDate::from_ymd_opt(year, month, 1)?;
  let next = if first.month() == 12 {
    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
  } else {
    NaiveDate::from_ymd_opt(year, month + 1, 1)?
  };
  Some((
    first.and_hms_opt(0, 0, 0)?.and_utc(),
    next.and_hms_opt(0, 0, 0)?.and_utc(),
  ))
}

fn round_cents(x: f64) -> f64 { (x * 100.0).round() / 100.0 }
