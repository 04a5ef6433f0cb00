//! [`SqliteStore`]: the SQLite implementation of [`VersionStore`].

use std::{path::Path, time::Duration};

use rusqlite::{
  ErrorCode, OptionalExtension as _, ffi, params, params_from_iter,
  types::Value as SqlValue,
};
use scd_core::{
  descriptor::VersionDescriptor,
  predicate::Predicate,
  row::Row,
  store::{InsertOutcome, LatestMap, VersionStore},
};

use crate::{
  Result,
  encode::{RawRow, ROW_COLUMNS, decode_version, encode_row, row_columns},
  error::StorageContext as _,
  query::{compile, json_list},
  schema::{PRAGMAS, entity_ddl},
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Connection settings applied when a store is opened.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// How long a writer waits on a locked database before failing.
  pub busy_timeout: Duration,
}

impl Default for StoreOptions {
  fn default() -> Self { Self { busy_timeout: Duration::from_secs(5) } }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A versioned record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and create tables for every
  /// descriptor.
  pub async fn open<I>(path: impl AsRef<Path>, descriptors: I) -> Result<Self>
  where
    I: IntoIterator,
    I::Item: AsRef<VersionDescriptor>,
  {
    Self::open_with(path, descriptors, &StoreOptions::default()).await
  }

  pub async fn open_with<I>(
    path: impl AsRef<Path>,
    descriptors: I,
    options: &StoreOptions,
  ) -> Result<Self>
  where
    I: IntoIterator,
    I::Item: AsRef<VersionDescriptor>,
  {
    let ddl = collect_ddl(descriptors);
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, ddl, options).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory<I>(descriptors: I) -> Result<Self>
  where
    I: IntoIterator,
    I::Item: AsRef<VersionDescriptor>,
  {
    let ddl = collect_ddl(descriptors);
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, ddl, &StoreOptions::default()).await
  }

  async fn init(
    conn: tokio_rusqlite::Connection,
    ddl: Vec<String>,
    options: &StoreOptions,
  ) -> Result<Self> {
    let busy_timeout = options.busy_timeout;
    conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(PRAGMAS)?;
        for statement in &ddl {
          conn.execute_batch(statement)?;
        }
        Ok(())
      })
      .await?;
    tracing::debug!(?busy_timeout, "sqlite store ready");
    Ok(Self { conn })
  }

  /// Create the table for an entity type not known when the store was
  /// opened.
  pub async fn register(&self, descriptor: &VersionDescriptor) -> Result<()> {
    let ddl = entity_ddl(descriptor);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    tracing::debug!(entity = descriptor.entity(), table = descriptor.table(), "registered entity table");
    Ok(())
  }

  /// Total stored rows for `descriptor`, across all versions.
  pub async fn row_count(&self, descriptor: &VersionDescriptor) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", descriptor.table());
    let count: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], |r| r.get(0))?))
      .await?;
    Ok(count.unsigned_abs())
  }

  async fn query_rows(
    &self,
    operation: &'static str,
    sql: String,
    params: Vec<SqlValue>,
  ) -> scd_core::Result<Vec<Row>> {
    let raws: Vec<RawRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params.iter()), RawRow::from_sql)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .context(operation)?;

    raws
      .into_iter()
      .map(RawRow::into_row)
      .collect::<Result<Vec<_>>>()
      .context(operation)
  }
}

fn collect_ddl<I>(descriptors: I) -> Vec<String>
where
  I: IntoIterator,
  I::Item: AsRef<VersionDescriptor>,
{
  descriptors
    .into_iter()
    .map(|d| entity_ddl(d.as_ref()))
    .collect()
}

/// `logical_id → max(version)` as a CTE named `latest`, optionally restricted
/// to the logical ids in a JSON-array parameter.
fn latest_cte(table: &str, restrict_ids: bool) -> String {
  let restrict = if restrict_ids {
    "WHERE logical_id IN (SELECT value FROM json_each(?))"
  } else {
    ""
  };
  format!(
    "WITH latest AS (
       SELECT logical_id, MAX(version) AS version
       FROM {table}
       {restrict}
       GROUP BY logical_id
     )"
  )
}

// ─── VersionStore impl ───────────────────────────────────────────────────────

impl VersionStore for SqliteStore {
  async fn insert(
    &self,
    descriptor: &VersionDescriptor,
    row: &Row,
  ) -> scd_core::Result<InsertOutcome> {
    let encoded = encode_row(row).context("insert")?;
    let sql = format!(
      "INSERT INTO {} ({ROW_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)",
      descriptor.table()
    );

    self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          &sql,
          params![
            encoded.uid,
            encoded.logical_id,
            encoded.version,
            encoded.payload,
            encoded.created_at,
          ],
        );
        match result {
          Ok(_) => Ok(InsertOutcome::Inserted),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
              && e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
          {
            Ok(InsertOutcome::UidTaken)
          }
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
              && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
          {
            Ok(InsertOutcome::VersionTaken)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await
      .context("insert")
  }

  async fn max_versions(
    &self,
    descriptor: &VersionDescriptor,
    ids: Option<&[String]>,
  ) -> scd_core::Result<LatestMap> {
    let params: Vec<SqlValue> = ids
      .map(|ids| json_list(ids))
      .transpose()
      .context("max_versions")?
      .into_iter()
      .collect();
    let sql = format!(
      "{} SELECT logical_id, version FROM latest",
      latest_cte(descriptor.table(), ids.is_some())
    );

    let pairs: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .context("max_versions")?;

    pairs
      .into_iter()
      .map(|(id, v)| decode_version(&id, v).map(|v| (id, v)))
      .collect::<Result<LatestMap>>()
      .context("max_versions")
  }

  async fn latest_rows(
    &self,
    descriptor: &VersionDescriptor,
    ids: Option<&[String]>,
    filter: Option<&Predicate>,
  ) -> scd_core::Result<Vec<Row>> {
    let mut params: Vec<SqlValue> = ids
      .map(|ids| json_list(ids))
      .transpose()
      .context("latest_rows")?
      .into_iter()
      .collect();

    let where_clause = match filter {
      Some(predicate) => {
        predicate.validate(descriptor)?;
        let fragment = compile(predicate, "r").context("latest_rows")?;
        params.extend(fragment.params);
        format!("WHERE {}", fragment.sql)
      }
      None => String::new(),
    };

    let sql = format!(
      "{cte}
       SELECT {cols}
       FROM {table} r
       JOIN latest l ON r.logical_id = l.logical_id AND r.version = l.version
       {where_clause}
       ORDER BY r.logical_id",
      cte = latest_cte(descriptor.table(), ids.is_some()),
      cols = row_columns("r"),
      table = descriptor.table(),
    );

    self.query_rows("latest_rows", sql, params).await
  }

  async fn history(
    &self,
    descriptor: &VersionDescriptor,
    logical_id: &str,
  ) -> scd_core::Result<Vec<Row>> {
    let sql = format!(
      "SELECT {ROW_COLUMNS} FROM {} WHERE logical_id = ? ORDER BY version",
      descriptor.table()
    );
    self
      .query_rows("history", sql, vec![SqlValue::Text(logical_id.to_owned())])
      .await
  }

  async fn rows_by_uid(
    &self,
    descriptor: &VersionDescriptor,
    uids: &[String],
  ) -> scd_core::Result<Vec<Row>> {
    if uids.is_empty() {
      return Ok(Vec::new());
    }
    let param = json_list(uids).context("rows_by_uid")?;
    let sql = format!(
      "SELECT {ROW_COLUMNS} FROM {} WHERE uid IN (SELECT value FROM json_each(?))",
      descriptor.table()
    );
    self.query_rows("rows_by_uid", sql, vec![param]).await
  }

  async fn row_at_version(
    &self,
    descriptor: &VersionDescriptor,
    logical_id: &str,
    version: u32,
  ) -> scd_core::Result<Option<Row>> {
    let sql = format!(
      "SELECT {ROW_COLUMNS} FROM {} WHERE logical_id = ?1 AND version = ?2",
      descriptor.table()
    );
    let logical_id = logical_id.to_owned();

    let raw: Option<RawRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, params![logical_id, i64::from(version)], RawRow::from_sql)
            .optional()?,
        )
      })
      .await
      .context("row_at_version")?;

    raw.map(RawRow::into_row).transpose().context("row_at_version")
  }
}
