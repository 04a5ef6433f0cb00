//! Row types, the unit of storage.
//!
//! A row is one immutable version of a logical entity. Rows are never updated
//! or deleted; a change to an entity is a new row with the next version
//! number.

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// Business attributes of a row, keyed by field name.
pub type Payload = serde_json::Map<String, Value>;

/// Longest logical id accepted.
pub const MAX_LOGICAL_ID_LEN: usize = 255;

// ─── Row ─────────────────────────────────────────────────────────────────────

/// One stored version of a logical entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
  /// Unique id of this exact version; what references pin to.
  pub uid:        String,
  /// Business id shared by every version of the entity.
  pub logical_id: String,
  /// 1-based, contiguous per `logical_id`.
  pub version:    u32,
  pub payload:    Payload,
  /// Server-assigned; never changes after insert.
  pub created_at: DateTime<Utc>,
}

/// Columns every row carries in addition to its payload. Always queryable.
pub const BUILTIN_FIELDS: [&str; 4] =
  ["logical_id", "uid", "version", "created_at"];

impl Row {
  /// Look up a field by name, covering both built-in columns and payload
  /// fields. `created_at` is returned in its encoded string form so that it
  /// compares the same way it does in storage.
  pub fn field(&self, name: &str) -> Option<Cow<'_, Value>> {
    match name {
      "logical_id" => Some(Cow::Owned(Value::String(self.logical_id.clone()))),
      "uid" => Some(Cow::Owned(Value::String(self.uid.clone()))),
      "version" => Some(Cow::Owned(Value::from(self.version))),
      "created_at" => {
        Some(Cow::Owned(Value::String(encode_timestamp(self.created_at))))
      }
      other => self.payload.get(other).map(Cow::Borrowed),
    }
  }

  /// Convenience accessor for string payload fields.
  pub fn str_field(&self, name: &str) -> Option<&str> {
    self.payload.get(name).and_then(Value::as_str)
  }

  /// Convenience accessor for numeric payload fields.
  pub fn f64_field(&self, name: &str) -> Option<f64> {
    self.payload.get(name).and_then(Value::as_f64)
  }
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 (microseconds, `Z` suffix), so that string order and
/// time order agree.
pub fn encode_timestamp(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Current time truncated to the precision rows are persisted with.
pub fn now() -> DateTime<Utc> {
  let now = Utc::now();
  parse_timestamp(&encode_timestamp(now)).unwrap_or(now)
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// A fresh logical id: `{prefix}_{32 hex}`.
pub fn generate_logical_id(prefix: &str) -> String {
  format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// A fresh row uid: `{prefix}_uid_{20 hex}`.
pub fn generate_uid(prefix: &str) -> String {
  let hex = Uuid::new_v4().simple().to_string();
  format!("{prefix}_uid_{}", &hex[..20])
}

/// Reject empty, oversized, or oddly-charactered logical ids.
pub fn validate_logical_id(entity: &str, id: &str) -> Result<()> {
  if id.is_empty() {
    return Err(Error::validation(entity, "logical_id", "must not be empty"));
  }
  if id.len() > MAX_LOGICAL_ID_LEN {
    return Err(Error::validation(
      entity,
      "logical_id",
      format!("longer than {MAX_LOGICAL_ID_LEN} characters"),
    ));
  }
  if let Some(bad) = id
    .chars()
    .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
  {
    return Err(Error::validation(
      entity,
      "logical_id",
      format!("illegal character {bad:?} in {id:?}"),
    ));
  }
  Ok(())
}
