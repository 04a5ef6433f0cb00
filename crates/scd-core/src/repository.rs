//! [`Repository`]: the public operation set for one entity type.
//!
//! Reads go through the [`Resolver`], writes through the
//! [`VersionController`]; every call is wrapped by the repository's
//! [`Interceptor`].

use std::{fmt, future::Future, sync::Arc, time::Instant};

use crate::{
  Error, Result,
  controller::{RetryPolicy, VersionController},
  descriptor::VersionDescriptor,
  interceptor::{Call, Interceptor, Operation, TracingInterceptor},
  predicate::Predicate,
  resolver::Resolver,
  row::{Payload, Row, validate_logical_id},
  store::{LatestMap, VersionStore},
};

/// Versioned access to one entity type in a [`VersionStore`].
///
/// Cloning is cheap: the store, descriptor, and interceptor are shared.
pub struct Repository<S> {
  store:       Arc<S>,
  descriptor:  Arc<VersionDescriptor>,
  policy:      RetryPolicy,
  interceptor: Arc<dyn Interceptor>,
}

impl<S> Clone for Repository<S> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      descriptor:  Arc::clone(&self.descriptor),
      policy:      self.policy,
      interceptor: Arc::clone(&self.interceptor),
    }
  }
}

impl<S> fmt::Debug for Repository<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Repository")
      .field("entity", &self.descriptor.entity())
      .field("policy", &self.policy)
      .finish_non_exhaustive()
  }
}

impl<S: VersionStore> Repository<S> {
  /// A repository with the default retry policy and tracing interceptor.
  pub fn new(store: Arc<S>, descriptor: Arc<VersionDescriptor>) -> Self {
    Self {
      store,
      descriptor,
      policy: RetryPolicy::default(),
      interceptor: Arc::new(TracingInterceptor),
    }
  }

  pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
    self.interceptor = interceptor;
    self
  }

  pub fn descriptor(&self) -> &Arc<VersionDescriptor> { &self.descriptor }

  pub fn entity(&self) -> &str { self.descriptor.entity() }

  pub fn store(&self) -> &Arc<S> { &self.store }

  fn resolver(&self) -> Resolver<'_, S> {
    Resolver::new(&self.store, &self.descriptor)
  }

  fn controller(&self) -> VersionController<'_, S> {
    VersionController::new(&self.store, &self.descriptor, self.policy)
  }

  async fn intercept<T, F>(
    &self,
    operation: Operation,
    key: Option<&str>,
    call: F,
  ) -> Result<T>
  where
    F: Future<Output = Result<T>>,
  {
    let call_info = Call { entity: self.descriptor.entity(), operation, key };
    self.interceptor.before(&call_info);
    let started = Instant::now();
    let result = call.await;
    self
      .interceptor
      .after(&call_info, result.as_ref().map(|_| ()), started.elapsed());
    result
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// The current row of `logical_id`.
  pub async fn get_latest(&self, logical_id: &str) -> Result<Row> {
    self
      .intercept(Operation::GetLatest, Some(logical_id), async {
        validate_logical_id(self.entity(), logical_id)?;
        self.resolver().require_latest(logical_id).await
      })
      .await
  }

  /// Current rows satisfying `predicate`, ordered by logical id. The
  /// predicate only ever sees latest rows.
  pub async fn get_latest_where(&self, predicate: &Predicate) -> Result<Vec<Row>> {
    self
      .intercept(Operation::GetLatestWhere, None, async {
        self.resolver().latest_where(predicate).await
      })
      .await
  }

  /// Current rows for the given ids. Ids with no rows are absent, not errors.
  pub async fn get_latest_many(&self, logical_ids: &[String]) -> Result<Vec<Row>> {
    self
      .intercept(Operation::GetLatestMany, None, async {
        self.resolver().latest_many(logical_ids).await
      })
      .await
  }

  /// `logical_id → max(version)` for every entity, or only `logical_ids`.
  pub async fn latest_map(&self, logical_ids: Option<&[String]>) -> Result<LatestMap> {
    self
      .intercept(Operation::LatestMap, None, async {
        self.resolver().latest_map(logical_ids).await
      })
      .await
  }

  /// Every version of `logical_id`, ascending.
  pub async fn get_history(&self, logical_id: &str) -> Result<Vec<Row>> {
    self
      .intercept(Operation::GetHistory, Some(logical_id), async {
        validate_logical_id(self.entity(), logical_id)?;
        let rows = self.store.history(&self.descriptor, logical_id).await?;
        if rows.is_empty() {
          return Err(Error::not_found(self.entity(), logical_id));
        }
        Ok(rows)
      })
      .await
  }

  /// One specific version of `logical_id`.
  pub async fn get_version(&self, logical_id: &str, version: u32) -> Result<Row> {
    self
      .intercept(Operation::GetVersion, Some(logical_id), async {
        validate_logical_id(self.entity(), logical_id)?;
        self
          .store
          .row_at_version(&self.descriptor, logical_id, version)
          .await?
          .ok_or_else(|| {
            Error::not_found(self.entity(), format!("{logical_id} v{version}"))
          })
      })
      .await
  }

  /// The exact row a pinned reference points at, whether or not it is still
  /// the latest version.
  pub async fn get_by_uid(&self, uid: &str) -> Result<Row> {
    self
      .intercept(Operation::GetByUid, Some(uid), async {
        let uids = [uid.to_owned()];
        self
          .store
          .rows_by_uid(&self.descriptor, &uids[..])
          .await?
          .into_iter()
          .next()
          .ok_or_else(|| Error::not_found(self.entity(), uid))
      })
      .await
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Create version 1 of a new entity. A logical id is generated when none
  /// is given.
  pub async fn create(&self, payload: Payload, logical_id: Option<&str>) -> Result<Row> {
    self
      .intercept(Operation::Create, logical_id, async {
        let payload = self.descriptor.prepare_initial(payload)?;
        self.check_references(&payload).await?;
        self
          .controller()
          .create_version(logical_id.map(str::to_owned), payload)
          .await
      })
      .await
  }

  /// Append a new version of `logical_id` with `changes` applied on top of
  /// the current latest payload.
  pub async fn update(&self, logical_id: &str, changes: Payload) -> Result<Row> {
    self
      .intercept(Operation::Update, Some(logical_id), async {
        self.check_references(&changes).await?;
        self
          .controller()
          .append_version(logical_id, |latest| {
            self.descriptor.merge_update(&latest.payload, &changes)
          })
          .await
      })
      .await
  }

  /// Every non-null reference in `payload` must name an existing row of its
  /// target entity.
  async fn check_references(&self, payload: &Payload) -> Result<()> {
    for (field, uid) in self.descriptor.references(payload) {
      let Some(target) = &field.target else { continue };
      let uids = [uid.to_owned()];
      let found = self.store.rows_by_uid(target, &uids[..]).await?;
      if found.is_empty() {
        return Err(Error::not_found(target.entity(), uid));
      }
    }
    Ok(())
  }
}
