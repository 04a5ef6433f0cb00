//! Repository, chain, and catalog tests against `MemoryStore`.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU32, Ordering},
  },
  time::Duration,
};

use chrono::{Duration as Span, Utc};
use serde_json::{Value, json};

use crate::{
  Error, ErrorKind, Result,
  catalog::{Catalog, Workforce},
  chain::{Chain, latest_referencing, resolve_references},
  controller::RetryPolicy,
  descriptor::VersionDescriptor,
  interceptor::{Call, Interceptor, NoopInterceptor, Operation},
  memory::MemoryStore,
  predicate::Predicate,
  repository::Repository,
  row::{Payload, Row, generate_uid},
  store::{InsertOutcome, LatestMap, VersionStore},
};

fn payload(v: Value) -> Payload { v.as_object().cloned().unwrap() }

fn fast_retries(max_attempts: u32) -> RetryPolicy {
  RetryPolicy {
    max_attempts,
    base_delay: Duration::from_millis(1),
    max_delay: Duration::from_millis(4),
    max_elapsed: None,
  }
}

fn job(company: &str, contractor: &str) -> Payload {
  payload(json!({
    "rate": 50.0,
    "title": "Backend Developer",
    "company_id": company,
    "contractor_id": contractor,
  }))
}

fn workforce() -> Workforce<MemoryStore> {
  Workforce::new(Arc::new(MemoryStore::new()), Catalog::build().unwrap())
    .with_interceptor(Arc::new(NoopInterceptor))
    .with_retry_policy(fast_retries(8))
}

// ─── Repository basics ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_latest() {
  let w = workforce();
  let created = w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  assert_eq!(created.version, 1);
  assert_eq!(created.logical_id, "job_001");
  assert!(created.uid.starts_with("job_uid_"));
  assert_eq!(created.payload["status"], "active");

  let latest = w.jobs.get_latest("job_001").await.unwrap();
  assert_eq!(latest, created);
}

#[tokio::test]
async fn generated_logical_ids_are_unique() {
  let w = workforce();
  let a = w.jobs.create(job("comp_001", "cont_001"), None).await.unwrap();
  let b = w.jobs.create(job("comp_001", "cont_001"), None).await.unwrap();
  assert_ne!(a.logical_id, b.logical_id);
  assert!(a.logical_id.starts_with("job_"));
}

#[tokio::test]
async fn update_appends_contiguous_versions() {
  let w = workforce();
  let v1 = w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let v2 = w.jobs.update("job_001", payload(json!({ "rate": 60.0 }))).await.unwrap();
  let v3 = w.jobs.update("job_001", payload(json!({ "status": "paused" }))).await.unwrap();

  assert_eq!(v2.version, 2);
  assert_eq!(v3.version, 3);
  assert_ne!(v1.uid, v2.uid);
  assert_ne!(v2.uid, v3.uid);
  // Unchanged fields carry forward.
  assert_eq!(v3.payload["rate"], 60.0);
  assert_eq!(v3.payload["title"], "Backend Developer");

  let history = w.jobs.get_history("job_001").await.unwrap();
  let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
  assert_eq!(versions, vec![1, 2, 3]);
  assert_eq!(history[0], v1);

  assert_eq!(w.jobs.get_latest("job_001").await.unwrap(), v3);
  assert_eq!(w.jobs.get_version("job_001", 2).await.unwrap(), v2);
  assert_eq!(w.jobs.get_by_uid(&v1.uid).await.unwrap(), v1);
}

#[tokio::test]
async fn rows_are_never_rewritten() {
  let w = workforce();
  let v1 = w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  w.jobs.update("job_001", payload(json!({ "status": "completed" }))).await.unwrap();

  let again = w.jobs.get_version("job_001", 1).await.unwrap();
  assert_eq!(again, v1);
  assert_eq!(again.payload["status"], "active");
  assert_eq!(w.jobs.store().row_count(w.jobs.descriptor()), 2);
}

#[tokio::test]
async fn missing_entities_are_not_found() {
  let w = workforce();
  let err = w.jobs.get_latest("job_404").await.unwrap_err();
  assert!(matches!(err, Error::NotFound { ref key, .. } if key == "job_404"));
  assert_eq!(w.jobs.get_history("job_404").await.unwrap_err().kind(), ErrorKind::NotFound);
  assert_eq!(
    w.jobs.update("job_404", payload(json!({ "rate": 1.0 }))).await.unwrap_err().kind(),
    ErrorKind::NotFound
  );
  assert_eq!(w.jobs.get_version("job_404", 1).await.unwrap_err().kind(), ErrorKind::NotFound);
  assert_eq!(w.jobs.get_by_uid("job_uid_nope").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
  let w = workforce();
  w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let err = w
    .jobs
    .create(job("comp_002", "cont_002"), Some("job_001"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateEntity { ref logical_id, .. } if logical_id == "job_001"));
  assert_eq!(w.jobs.get_history("job_001").await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_writes_are_rejected_without_side_effects() {
  let w = workforce();
  assert_eq!(
    w.jobs.create(job("c", "k"), Some("")).await.unwrap_err().kind(),
    ErrorKind::Validation
  );
  assert_eq!(
    w.jobs.create(job("c", "k"), Some("has space")).await.unwrap_err().kind(),
    ErrorKind::Validation
  );

  w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let err = w
    .jobs
    .update("job_001", payload(json!({ "company_id": "comp_999" })))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { ref field, .. } if field == "company_id"));
  let err = w
    .jobs
    .update("job_001", payload(json!({ "status": "exploded" })))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert_eq!(w.jobs.get_history("job_001").await.unwrap().len(), 1);
}

#[tokio::test]
async fn dangling_references_are_rejected() {
  let w = workforce();
  let err = w
    .timelogs
    .create(
      payload(json!({
        "duration": 1000,
        "time_start": 0,
        "time_end": 1000,
        "job_uid": "job_uid_missing",
      })),
      None,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound { ref entity, .. } if entity == "job"));
}

// ─── Latest resolution ───────────────────────────────────────────────────────

#[tokio::test]
async fn filters_see_only_latest_versions() {
  let w = workforce();
  w.jobs.create(job("comp_001", "cont_001"), Some("job_1")).await.unwrap();
  w.jobs.update("job_1", payload(json!({ "rate": 70.0 }))).await.unwrap();
  w.jobs.update("job_1", payload(json!({ "status": "completed" }))).await.unwrap();
  w.jobs.create(job("comp_001", "cont_002"), Some("job_2")).await.unwrap();

  let active = w
    .jobs
    .get_latest_where(&Predicate::eq("status", "active"))
    .await
    .unwrap();
  let ids: Vec<&str> = active.iter().map(|r| r.logical_id.as_str()).collect();
  assert_eq!(ids, vec!["job_2"]);

  let completed = w
    .jobs
    .get_latest_where(&Predicate::eq("status", "completed"))
    .await
    .unwrap();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].version, 3);
}

#[tokio::test]
async fn latest_many_skips_unknown_ids() {
  let w = workforce();
  w.jobs.create(job("comp_001", "cont_001"), Some("job_1")).await.unwrap();
  w.jobs.update("job_1", payload(json!({ "rate": 1.0 }))).await.unwrap();
  w.jobs.create(job("comp_001", "cont_001"), Some("job_2")).await.unwrap();

  let rows = w
    .jobs
    .get_latest_many(&["job_2".to_owned(), "ghost".to_owned(), "job_1".to_owned()])
    .await
    .unwrap();
  let got: Vec<(&str, u32)> = rows.iter().map(|r| (r.logical_id.as_str(), r.version)).collect();
  assert_eq!(got, vec![("job_1", 2), ("job_2", 1)]);

  assert!(w.jobs.get_latest_many(&[]).await.unwrap().is_empty());

  let map = w.jobs.latest_map(None).await.unwrap();
  assert_eq!(map, LatestMap::from([("job_1".to_owned(), 2), ("job_2".to_owned(), 1)]));
}

#[tokio::test]
async fn empty_table_resolves_to_nothing() {
  let w = workforce();
  assert!(w.jobs.get_latest_where(&Predicate::all([])).await.unwrap().is_empty());
  assert!(w.jobs.latest_map(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn unqueryable_predicate_is_a_validation_error() {
  let w = workforce();
  let err = w
    .jobs
    .get_latest_where(&Predicate::eq("title", "Backend Developer"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { ref field, .. } if field == "title"));
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

/// Lets another writer win the first append race it sees.
struct RacingStore {
  inner: MemoryStore,
  raced: AtomicBool,
}

impl VersionStore for RacingStore {
  async fn insert(&self, descriptor: &VersionDescriptor, row: &Row) -> Result<InsertOutcome> {
    if row.version > 1 && !self.raced.swap(true, Ordering::SeqCst) {
      let mut rival = row.clone();
      rival.uid = generate_uid(descriptor.entity());
      rival.payload.insert("title".into(), json!("Rival Title"));
      self.inner.insert(descriptor, &rival).await?;
    }
    self.inner.insert(descriptor, row).await
  }

  async fn max_versions(&self, d: &VersionDescriptor, ids: Option<&[String]>) -> Result<LatestMap> {
    self.inner.max_versions(d, ids).await
  }

  async fn latest_rows(
    &self,
    d: &VersionDescriptor,
    ids: Option<&[String]>,
    filter: Option<&Predicate>,
  ) -> Result<Vec<Row>> {
    self.inner.latest_rows(d, ids, filter).await
  }

  async fn history(&self, d: &VersionDescriptor, logical_id: &str) -> Result<Vec<Row>> {
    self.inner.history(d, logical_id).await
  }

  async fn rows_by_uid(&self, d: &VersionDescriptor, uids: &[String]) -> Result<Vec<Row>> {
    self.inner.rows_by_uid(d, uids).await
  }

  async fn row_at_version(
    &self,
    d: &VersionDescriptor,
    logical_id: &str,
    version: u32,
  ) -> Result<Option<Row>> {
    self.inner.row_at_version(d, logical_id, version).await
  }
}

/// Every append loses; counts the attempts.
struct ContendedStore {
  inner:    MemoryStore,
  attempts: AtomicU32,
}

impl VersionStore for ContendedStore {
  async fn insert(&self, descriptor: &VersionDescriptor, row: &Row) -> Result<InsertOutcome> {
    if row.version > 1 {
      self.attempts.fetch_add(1, Ordering::SeqCst);
      return Ok(InsertOutcome::VersionTaken);
    }
    self.inner.insert(descriptor, row).await
  }

  async fn max_versions(&self, d: &VersionDescriptor, ids: Option<&[String]>) -> Result<LatestMap> {
    self.inner.max_versions(d, ids).await
  }

  async fn latest_rows(
    &self,
    d: &VersionDescriptor,
    ids: Option<&[String]>,
    filter: Option<&Predicate>,
  ) -> Result<Vec<Row>> {
    self.inner.latest_rows(d, ids, filter).await
  }

  async fn history(&self, d: &VersionDescriptor, logical_id: &str) -> Result<Vec<Row>> {
    self.inner.history(d, logical_id).await
  }

  async fn rows_by_uid(&self, d: &VersionDescriptor, uids: &[String]) -> Result<Vec<Row>> {
    self.inner.rows_by_uid(d, uids).await
  }

  async fn row_at_version(
    &self,
    d: &VersionDescriptor,
    logical_id: &str,
    version: u32,
  ) -> Result<Option<Row>> {
    self.inner.row_at_version(d, logical_id, version).await
  }
}

#[tokio::test]
async fn lost_race_retries_on_top_of_the_winner() {
  let catalog = Catalog::build().unwrap();
  let store = Arc::new(RacingStore { inner: MemoryStore::new(), raced: AtomicBool::new(false) });
  let jobs = Repository::new(store, Arc::clone(&catalog.jobs))
    .with_retry_policy(fast_retries(4));

  jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let ours = jobs.update("job_001", payload(json!({ "rate": 99.0 }))).await.unwrap();

  // The rival took version 2; ours became version 3 and kept its change.
  assert_eq!(ours.version, 3);
  assert_eq!(ours.payload["rate"], 99.0);
  assert_eq!(ours.payload["title"], "Rival Title");

  let versions: Vec<u32> = jobs
    .get_history("job_001")
    .await
    .unwrap()
    .iter()
    .map(|r| r.version)
    .collect();
  assert_eq!(versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn exhausted_retries_surface_a_conflict() {
  let catalog = Catalog::build().unwrap();
  let store = Arc::new(ContendedStore { inner: MemoryStore::new(), attempts: AtomicU32::new(0) });
  let jobs = Repository::new(Arc::clone(&store), Arc::clone(&catalog.jobs))
    .with_retry_policy(fast_retries(3));

  jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let err = jobs
    .update("job_001", payload(json!({ "rate": 1.0 })))
    .await
    .unwrap_err();

  assert!(matches!(err, Error::ConcurrencyConflict { attempts: 3, .. }));
  assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
  assert_eq!(jobs.get_history("job_001").await.unwrap().len(), 1);
}

#[tokio::test]
async fn deadline_cuts_retries_short() {
  let catalog = Catalog::build().unwrap();
  let store = Arc::new(ContendedStore { inner: MemoryStore::new(), attempts: AtomicU32::new(0) });
  let jobs = Repository::new(Arc::clone(&store), Arc::clone(&catalog.jobs))
    .with_retry_policy(RetryPolicy {
      max_attempts: 100,
      base_delay:   Duration::from_millis(20),
      max_delay:    Duration::from_millis(20),
      max_elapsed:  Some(Duration::from_millis(50)),
    });

  jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let err = jobs.update("job_001", payload(json!({ "rate": 1.0 }))).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
  assert!(store.attempts.load(Ordering::SeqCst) < 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_updates_produce_contiguous_history() {
  let catalog = Catalog::build().unwrap();
  let jobs = Arc::new(
    Repository::new(Arc::new(MemoryStore::new()), Arc::clone(&catalog.jobs))
      .with_interceptor(Arc::new(NoopInterceptor))
      .with_retry_policy(fast_retries(64)),
  );
  jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();

  let writers: Vec<_> = (0..8)
    .map(|i| {
      let jobs = Arc::clone(&jobs);
      tokio::spawn(async move {
        jobs
          .update("job_001", payload(json!({ "rate": f64::from(i) })))
          .await
      })
    })
    .collect();
  for writer in writers {
    writer.await.unwrap().unwrap();
  }

  let history = jobs.get_history("job_001").await.unwrap();
  let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
  assert_eq!(versions, (1..=9).collect::<Vec<_>>());
}

// ─── Interceptor ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
  calls: Mutex<Vec<(Operation, Option<String>, bool)>>,
}

impl Interceptor for Recorder {
  fn after(&self, call: &Call<'_>, outcome: std::result::Result<(), &Error>, _: Duration) {
    self
      .calls
      .lock()
      .unwrap()
      .push((call.operation, call.key.map(str::to_owned), outcome.is_ok()));
  }
}

#[tokio::test]
async fn interceptor_sees_every_call() {
  let catalog = Catalog::build().unwrap();
  let recorder = Arc::new(Recorder::default());
  let jobs = Repository::new(Arc::new(MemoryStore::new()), Arc::clone(&catalog.jobs))
    .with_interceptor(recorder.clone());

  jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  jobs.update("job_001", payload(json!({ "rate": 2.0 }))).await.unwrap();
  jobs.get_latest("job_404").await.unwrap_err();

  let calls = recorder.calls.lock().unwrap();
  assert_eq!(
    *calls,
    vec![
      (Operation::Create, Some("job_001".to_owned()), true),
      (Operation::Update, Some("job_001".to_owned()), true),
      (Operation::GetLatest, Some("job_404".to_owned()), false),
    ]
  );
}

// ─── Chaining ────────────────────────────────────────────────────────────────

async fn timelog(w: &Workforce<MemoryStore>, job_uid: &str, start: i64, hours: i64) -> Row {
  let duration = hours * 3_600_000;
  w.timelogs
    .create(
      payload(json!({
        "duration": duration,
        "time_start": start,
        "time_end": start + duration,
        "job_uid": job_uid,
      })),
      None,
    )
    .await
    .unwrap()
}

async fn payment(w: &Workforce<MemoryStore>, job_uid: &str, timelog_uid: &str, amount: f64) -> Row {
  w.payment_line_items
    .create(
      payload(json!({
        "amount": amount,
        "job_uid": job_uid,
        "timelog_uid": timelog_uid,
      })),
      None,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn chains_follow_only_current_parent_versions() {
  let w = workforce();
  let v1 = w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let log_old = timelog(&w, &v1.uid, 0, 1).await;

  let v2 = w.jobs.update("job_001", payload(json!({ "rate": 75.0 }))).await.unwrap();
  let log_new = timelog(&w, &v2.uid, 10_000_000, 2).await;

  let logs = latest_referencing(
    &w.jobs,
    Predicate::eq("contractor_id", "cont_001"),
    &w.timelogs,
    "job_uid",
    None,
  )
  .await
  .unwrap();
  let uids: Vec<&str> = logs.iter().map(|r| r.uid.as_str()).collect();
  assert_eq!(uids, vec![log_new.uid.as_str()]);

  // The older timelog still pins v1 exactly.
  let pinned = w.jobs.get_by_uid(log_old.str_field("job_uid").unwrap()).await.unwrap();
  assert_eq!(pinned, v1);

  // Resolving its reference forward lands on the current version.
  let current = resolve_references(&[log_old.clone()], "job_uid", &w.jobs).await.unwrap();
  assert_eq!(current[&v1.uid], v2);
}

#[tokio::test]
async fn chains_apply_filters_per_hop() {
  let w = workforce();
  let j = w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let short = timelog(&w, &j.uid, 0, 1).await;
  let long = timelog(&w, &j.uid, 100_000_000, 8).await;
  payment(&w, &j.uid, &short.uid, 50.0).await;
  let big = payment(&w, &j.uid, &long.uid, 400.0).await;

  let items = Chain::from(&w.jobs, Predicate::eq("company_id", "comp_001"))
    .then(&w.timelogs, "job_uid", Some(Predicate::at_least("time_start", 50_000_000)))
    .then(&w.payment_line_items, "timelog_uid", None)
    .run()
    .await
    .unwrap();
  assert_eq!(items.len(), 1);
  assert_eq!(items[0].uid, big.uid);

  let none = Chain::from(&w.jobs, Predicate::eq("company_id", "comp_404"))
    .then(&w.timelogs, "job_uid", None)
    .run()
    .await
    .unwrap();
  assert!(none.is_empty());
}

#[tokio::test]
async fn chains_reject_mismatched_links() {
  let w = workforce();
  let err = Chain::from(&w.timelogs, Predicate::all([]))
    .then(&w.payment_line_items, "job_uid", None)
    .run()
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { ref field, .. } if field == "job_uid"));

  let err = Chain::from(&w.jobs, Predicate::all([]))
    .then(&w.payment_line_items, "amount", None)
    .run()
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

// ─── Catalog queries ─────────────────────────────────────────────────────────

#[tokio::test]
async fn active_job_queries() {
  let w = workforce();
  w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  w.jobs.create(job("comp_001", "cont_002"), Some("job_002")).await.unwrap();
  w.jobs.create(job("comp_002", "cont_001"), Some("job_003")).await.unwrap();
  w.jobs.update("job_002", payload(json!({ "status": "completed" }))).await.unwrap();

  let for_company = w.active_jobs_for_company("comp_001").await.unwrap();
  let ids: Vec<&str> = for_company.iter().map(|r| r.logical_id.as_str()).collect();
  assert_eq!(ids, vec!["job_001"]);

  let for_contractor = w.active_jobs_for_contractor("cont_001").await.unwrap();
  let ids: Vec<&str> = for_contractor.iter().map(|r| r.logical_id.as_str()).collect();
  assert_eq!(ids, vec!["job_001", "job_003"]);
}

#[tokio::test]
async fn contractor_dashboard_totals() {
  let w = workforce();
  let j = w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let other = w.jobs.create(job("comp_001", "cont_002"), Some("job_002")).await.unwrap();

  let now = Utc::now();
  let start = now.timestamp_millis() - 10 * 3_600_000;
  let a = timelog(&w, &j.uid, start, 2).await;
  let b = timelog(&w, &j.uid, start + 3 * 3_600_000, 3).await;
  let foreign = timelog(&w, &other.uid, start, 4).await;
  payment(&w, &j.uid, &a.uid, 100.0).await;
  payment(&w, &j.uid, &b.uid, 150.5).await;
  payment(&w, &other.uid, &foreign.uid, 999.0).await;

  let dash = w
    .contractor_dashboard("cont_001", now - Span::days(1), now + Span::days(1))
    .await
    .unwrap();
  assert_eq!(dash.jobs.len(), 1);
  assert_eq!(dash.timelogs.len(), 2);
  assert_eq!(dash.payment_items.len(), 2);
  assert_eq!(dash.total_hours, 5.0);
  assert_eq!(dash.total_amount, 250.5);

  let items = w
    .payment_items_for_contractor("cont_001", now - Span::days(1), now + Span::days(1))
    .await
    .unwrap();
  assert_eq!(items.len(), 2);
  let logs = w
    .timelogs_for_contractor("cont_001", start, start + 5 * 3_600_000)
    .await
    .unwrap();
  assert_eq!(logs.len(), 1);
  assert_eq!(logs[0].uid, a.uid);

  let empty = w
    .contractor_dashboard("cont_404", now - Span::days(1), now + Span::days(1))
    .await
    .unwrap();
  assert!(empty.jobs.is_empty());
  assert_eq!(empty.total_amount, 0.0);
}

#[tokio::test]
async fn company_spending_by_month() {
  let w = workforce();
  let j1 = w.jobs.create(job("comp_001", "cont_001"), Some("job_001")).await.unwrap();
  let j2 = w.jobs.create(job("comp_001", "cont_002"), Some("job_002")).await.unwrap();
  let t1 = timelog(&w, &j1.uid, 0, 1).await;
  let t2 = timelog(&w, &j2.uid, 0, 1).await;

  let march = "2024-03-15T12:00:00Z";
  let p1 = payment(&w, &j1.uid, &t1.uid, 100.0).await;
  let p2 = payment(&w, &j1.uid, &t1.uid, 25.25).await;
  let p3 = payment(&w, &j2.uid, &t2.uid, 40.0).await;
  let unpaid = payment(&w, &j2.uid, &t2.uid, 1000.0).await;
  for p in [&p1, &p2, &p3] {
    w.payment_line_items
      .update(&p.logical_id, payload(json!({ "status": "paid", "payment_date": march })))
      .await
      .unwrap();
  }
  w.payment_line_items
    .update(&unpaid.logical_id, payload(json!({ "status": "pending" })))
    .await
    .unwrap();

  let report = w.company_spending("comp_001", 2024, 3).await.unwrap();
  assert_eq!(report.period, "2024-03");
  assert_eq!(report.payment_count, 3);
  assert_eq!(report.total_paid, 165.25);
  assert_eq!(report.job_breakdown["job_001"], 125.25);
  assert_eq!(report.job_breakdown["job_002"], 40.0);

  let april = w.company_spending("comp_001", 2024, 4).await.unwrap();
  assert_eq!(april.payment_count, 0);
  assert_eq!(
    w.company_spending("comp_001", 2024, 0).await.unwrap_err().kind(),
    ErrorKind::Validation
  );
}

#[tokio::test]
async fn repository_lookup_by_entity_name() {
  let w = workforce();
  assert_eq!(w.repository("timelog").unwrap().entity(), "timelog");
  assert_eq!(w.repository("contractor").unwrap_err().kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn time_filters_accept_any_rfc3339_spelling() {
  let w = workforce();
  let j = w.jobs.create(job("comp_001", "cont_001"), None).await.unwrap();
  let t = timelog(&w, &j.uid, 0, 1).await;
  let p = payment(&w, &j.uid, &t.uid, 10.0).await;
  let paid = w
    .payment_line_items
    .update(
      &p.logical_id,
      payload(json!({ "status": "paid", "payment_date": "2024-03-15T12:00:00Z" })),
    )
    .await
    .unwrap();
  assert_eq!(paid.payload["payment_date"], "2024-03-15T12:00:00.000000Z");

  let items = &w.payment_line_items;
  for predicate in [
    Predicate::eq("payment_date", "2024-03-15T12:00:00Z"),
    Predicate::eq("payment_date", "2024-03-15T14:00:00+02:00"),
    Predicate::at_least("payment_date", "2024-03-15T12:00:00Z"),
    Predicate::at_least("payment_date", "2024-03-15T13:00:00+02:00"),
    Predicate::between("payment_date", "2024-03-15T00:00:00Z", "2024-03-15T12:00:00Z"),
  ] {
    let rows = items.get_latest_where(&predicate).await.unwrap();
    assert_eq!(rows.len(), 1, "{predicate:?}");
  }
  let later = Predicate::range(
    "payment_date",
    std::ops::Bound::Excluded(json!("2024-03-15T14:00:00+02:00")),
    std::ops::Bound::Unbounded,
  );
  assert!(items.get_latest_where(&later).await.unwrap().is_empty());

  let err = items
    .get_latest_where(&Predicate::at_least("payment_date", "last tuesday"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { ref field, .. } if field == "payment_date"));
}

#[tokio::test]
async fn version_counter_cannot_overflow() {
  let w = workforce();
  let mut initial = job("comp_001", "cont_001");
  initial.insert("status".into(), json!("active"));
  initial.insert("description".into(), json!(""));
  let last = Row {
    uid:        generate_uid("job"),
    logical_id: "job_max".into(),
    version:    u32::MAX,
    payload:    initial,
    created_at: Utc::now(),
  };
  let outcome = w.jobs.store().insert(w.jobs.descriptor(), &last).await.unwrap();
  assert_eq!(outcome, InsertOutcome::Inserted);

  let err = w
    .jobs
    .update("job_max", payload(json!({ "rate": 60.0 })))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { ref field, .. } if field == "version"));
  assert_eq!(w.jobs.get_history("job_max").await.unwrap().len(), 1);
}

#[test]
fn repositories_debug_print_their_entity() {
  let w = workforce();
  let printed = format!("{:?}", w.jobs);
  assert!(printed.contains("Repository"));
  assert!(printed.contains("\"job\""));
}
