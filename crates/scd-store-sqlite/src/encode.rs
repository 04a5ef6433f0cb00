//! Encoding and decoding between [`Row`] and the plain-text columns stored in
//! SQLite.
//!
//! Payloads are stored as compact JSON objects. Timestamps use the core
//! crate's fixed-width RFC 3339 form so that `created_at` sorts correctly as
//! text.

use scd_core::row::{Payload, Row, encode_timestamp, parse_timestamp};

use crate::{Error, Result};

/// Columns selected for a row, in this order.
pub const ROW_COLUMNS: &str = "uid, logical_id, version, payload, created_at";

/// The same columns qualified with a table alias.
pub fn row_columns(alias: &str) -> String {
  ROW_COLUMNS
    .split(", ")
    .map(|c| format!("{alias}.{c}"))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Column values for an insert.
pub struct EncodedRow {
  pub uid:        String,
  pub logical_id: String,
  pub version:    i64,
  pub payload:    String,
  pub created_at: String,
}

pub fn encode_row(row: &Row) -> Result<EncodedRow> {
  Ok(EncodedRow {
    uid:        row.uid.clone(),
    logical_id: row.logical_id.clone(),
    version:    i64::from(row.version),
    payload:    serde_json::to_string(&row.payload)?,
    created_at: encode_timestamp(row.created_at),
  })
}

/// A stored version number, which must fit a `u32` and be at least 1.
pub fn decode_version(key: &str, version: i64) -> Result<u32> {
  u32::try_from(version)
    .ok()
    .filter(|v| *v >= 1)
    .ok_or_else(|| Error::CorruptRow {
      key:    key.to_owned(),
      reason: format!("version {version} out of range"),
    })
}

/// Raw values read directly from an entity table.
pub struct RawRow {
  pub uid:        String,
  pub logical_id: String,
  pub version:    i64,
  pub payload:    String,
  pub created_at: String,
}

impl RawRow {
  /// Read the [`ROW_COLUMNS`] starting at column 0.
  pub fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uid:        row.get(0)?,
      logical_id: row.get(1)?,
      version:    row.get(2)?,
      payload:    row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_row(self) -> Result<Row> {
    let version = decode_version(&self.uid, self.version)?;

    let payload: Payload = serde_json::from_str(&self.payload)?;

    let created_at = parse_timestamp(&self.created_at)
      .ok_or_else(|| Error::DateParse(self.created_at.clone()))?;

    Ok(Row {
      uid: self.uid,
      logical_id: self.logical_id,
      version,
      payload,
      created_at,
    })
  }
}
