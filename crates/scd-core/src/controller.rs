//! Version allocation under concurrent writers.
//!
//! There is no counter and no lock. A writer reads the current latest row,
//! builds version `n + 1`, and tries to insert it; the store's uniqueness
//! constraint on `(logical_id, version)` decides who wins. A loser re-reads
//! and tries again after a growing delay, up to the [`RetryPolicy`] budget,
//! and then surfaces [`Error::ConcurrencyConflict`].

use std::time::{Duration, Instant};

use crate::{
  Error, Result,
  descriptor::VersionDescriptor,
  resolver::Resolver,
  row::{Payload, Row, generate_logical_id, generate_uid, now, validate_logical_id},
  store::{InsertOutcome, VersionStore},
};

// ─── Retry policy ────────────────────────────────────────────────────────────

/// Bounds on the append retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total insert attempts, including the first. At least 1.
  pub max_attempts: u32,
  pub base_delay:   Duration,
  pub max_delay:    Duration,
  /// Wall-clock budget for the whole loop. `None` means attempts alone bound
  /// it.
  pub max_elapsed:  Option<Duration>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 8,
      base_delay:   Duration::from_millis(10),
      max_delay:    Duration::from_millis(500),
      max_elapsed:  None,
    }
  }
}

impl RetryPolicy {
  /// Delay after the `attempt`-th failure (0-based): `base · 2^attempt`,
  /// capped at `max_delay`. Never decreases as `attempt` grows.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(16);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  fn attempts(&self) -> u32 { self.max_attempts.max(1) }
}

// ─── Controller ──────────────────────────────────────────────────────────────

/// Write-side protocol for one entity type.
pub struct VersionController<'s, S> {
  store:      &'s S,
  descriptor: &'s VersionDescriptor,
  policy:     RetryPolicy,
}

impl<'s, S: VersionStore> VersionController<'s, S> {
  pub fn new(
    store: &'s S,
    descriptor: &'s VersionDescriptor,
    policy: RetryPolicy,
  ) -> Self {
    Self { store, descriptor, policy }
  }

  /// Insert version 1 of a new logical entity. `payload` must already be
  /// complete (see [`VersionDescriptor::prepare_initial`]).
  pub async fn create_version(
    &self,
    logical_id: Option<String>,
    payload: Payload,
  ) -> Result<Row> {
    let entity = self.descriptor.entity();
    let logical_id = match logical_id {
      Some(id) => {
        validate_logical_id(entity, &id)?;
        id
      }
      None => generate_logical_id(entity),
    };

    let mut row = Row {
      uid: generate_uid(entity),
      logical_id,
      version: 1,
      payload,
      created_at: now(),
    };

    for _ in 0..self.policy.attempts() {
      match self.store.insert(self.descriptor, &row).await? {
        InsertOutcome::Inserted => {
          tracing::debug!(entity, logical_id = %row.logical_id, uid = %row.uid, "created version 1");
          return Ok(row);
        }
        InsertOutcome::VersionTaken => {
          return Err(Error::DuplicateEntity {
            entity:     entity.to_owned(),
            logical_id: row.logical_id,
          });
        }
        InsertOutcome::UidTaken => row.uid = generate_uid(entity),
      }
    }

    Err(Error::ConcurrencyConflict {
      entity:     entity.to_owned(),
      logical_id: row.logical_id,
      attempts:   self.policy.attempts(),
    })
  }

  /// Insert the next version of `logical_id`, carrying forward every field
  /// `build` does not change.
  ///
  /// `build` receives the current latest row and returns the payload of the
  /// next version; it is re-run against the fresh latest row after every lost
  /// race, so changes are always applied on top of the real predecessor.
  pub async fn append_version<F>(&self, logical_id: &str, build: F) -> Result<Row>
  where
    F: Fn(&Row) -> Result<Payload>,
  {
    let entity = self.descriptor.entity();
    validate_logical_id(entity, logical_id)?;

    let resolver = Resolver::new(self.store, self.descriptor);
    let started = Instant::now();
    let attempts = self.policy.attempts();

    for attempt in 0..attempts {
      let latest = resolver.require_latest(logical_id).await?;
      let version = latest.version.checked_add(1).ok_or_else(|| {
        Error::validation(entity, "version", format!("{logical_id} has no versions left"))
      })?;
      let candidate = Row {
        uid:        generate_uid(entity),
        logical_id: logical_id.to_owned(),
        version,
        payload:    build(&latest)?,
        created_at: now(),
      };

      match self.store.insert(self.descriptor, &candidate).await? {
        InsertOutcome::Inserted => {
          tracing::debug!(
            entity,
            logical_id,
            from = latest.version,
            to = candidate.version,
            attempt,
            "appended version"
          );
          return Ok(candidate);
        }
        outcome @ (InsertOutcome::VersionTaken | InsertOutcome::UidTaken) => {
          if attempt + 1 == attempts {
            break;
          }
          let delay = self.policy.backoff(attempt);
          if let Some(budget) = self.policy.max_elapsed
            && started.elapsed() + delay > budget
          {
            tracing::warn!(entity, logical_id, attempt, "retry budget exhausted by deadline");
            return Err(self.conflict(logical_id, attempt + 1));
          }
          tracing::debug!(
            entity,
            logical_id,
            version = candidate.version,
            ?outcome,
            ?delay,
            "lost version race, retrying"
          );
          tokio::time::sleep(delay).await;
        }
      }
    }

    tracing::warn!(entity, logical_id, attempts, "retry budget exhausted");
    Err(self.conflict(logical_id, attempts))
  }

  fn conflict(&self, logical_id: &str, attempts: u32) -> Error {
    Error::ConcurrencyConflict {
      entity: self.descriptor.entity().to_owned(),
      logical_id: logical_id.to_owned(),
      attempts,
    }
  }
}
