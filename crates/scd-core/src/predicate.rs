//! Typed filters over latest rows.
//!
//! A [`Predicate`] is validated against a [`VersionDescriptor`] before it
//! reaches storage: naming a field that is not queryable is a validation
//! error, never a silently ignored filter.

use std::{cmp::Ordering, ops::Bound};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
  Error, Result,
  descriptor::{FieldKind, VersionDescriptor},
  row::{Row, encode_timestamp, parse_timestamp},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  Equals {
    field: String,
    value: Value,
  },
  InSet {
    field:  String,
    values: Vec<Value>,
  },
  Range {
    field: String,
    lower: Bound<Value>,
    upper: Bound<Value>,
  },
  /// The reference field holds one of these row uids.
  ReferenceIn {
    field: String,
    uids:  Vec<String>,
  },
  /// Conjunction; empty matches everything.
  All(Vec<Predicate>),
}

impl Predicate {
  pub fn eq(field: &str, value: impl Into<Value>) -> Self {
    Self::Equals { field: field.to_owned(), value: value.into() }
  }

  pub fn in_set<I, V>(field: &str, values: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
  {
    Self::InSet {
      field:  field.to_owned(),
      values: values.into_iter().map(Into::into).collect(),
    }
  }

  pub fn range(field: &str, lower: Bound<Value>, upper: Bound<Value>) -> Self {
    Self::Range { field: field.to_owned(), lower, upper }
  }

  /// Inclusive on both ends.
  pub fn between(
    field: &str,
    low: impl Into<Value>,
    high: impl Into<Value>,
  ) -> Self {
    Self::range(field, Bound::Included(low.into()), Bound::Included(high.into()))
  }

  pub fn at_least(field: &str, low: impl Into<Value>) -> Self {
    Self::range(field, Bound::Included(low.into()), Bound::Unbounded)
  }

  pub fn at_most(field: &str, high: impl Into<Value>) -> Self {
    Self::range(field, Bound::Unbounded, Bound::Included(high.into()))
  }

  /// Rows created within `[start, end]`.
  pub fn created_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self::between("created_at", encode_timestamp(start), encode_timestamp(end))
  }

  pub fn reference_in<I, S>(field: &str, uids: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::ReferenceIn {
      field: field.to_owned(),
      uids:  uids.into_iter().map(Into::into).collect(),
    }
  }

  pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
    Self::All(predicates.into_iter().collect())
  }

  /// Conjoin with another predicate, flattening nested conjunctions.
  pub fn and(self, other: Predicate) -> Self {
    let mut parts = match self {
      Self::All(parts) => parts,
      single => vec![single],
    };
    match other {
      Self::All(more) => parts.extend(more),
      single => parts.push(single),
    }
    Self::All(parts)
  }

  /// Check every field named by this predicate against `descriptor`.
  pub fn validate(&self, descriptor: &VersionDescriptor) -> Result<()> {
    self.normalize(descriptor).map(drop)
  }

  /// Validate against `descriptor` and return the predicate with every value
  /// aimed at a timestamp field rewritten to the stored form, so that
  /// `…T12:00:00Z` and `…T14:00:00+02:00` select the same rows as the
  /// `…T12:00:00.000000Z` that was written. Array and object values are
  /// rejected; no stored column compares against them.
  pub fn normalize(&self, descriptor: &VersionDescriptor) -> Result<Predicate> {
    let check = |field: &str| -> Result<bool> {
      if !descriptor.is_queryable(field) {
        return Err(Error::validation(
          descriptor.entity(),
          field,
          "is not a queryable field",
        ));
      }
      Ok(
        field == "created_at"
          || descriptor.field(field).is_some_and(|f| f.kind == FieldKind::Timestamp),
      )
    };
    let value = |field: &str, timestamp: bool, v: &Value| -> Result<Value> {
      normalize_value(descriptor.entity(), field, timestamp, v)
    };

    Ok(match self {
      Self::Equals { field, value: v } => {
        let timestamp = check(field.as_str())?;
        Self::Equals { field: field.clone(), value: value(field.as_str(), timestamp, v)? }
      }
      Self::InSet { field, values } => {
        let timestamp = check(field.as_str())?;
        Self::InSet {
          field:  field.clone(),
          values: values
            .iter()
            .map(|v| value(field.as_str(), timestamp, v))
            .collect::<Result<_>>()?,
        }
      }
      Self::Range { field, lower, upper } => {
        let timestamp = check(field.as_str())?;
        let bound = |b: &Bound<Value>| -> Result<Bound<Value>> {
          Ok(match b {
            Bound::Included(v) => Bound::Included(value(field.as_str(), timestamp, v)?),
            Bound::Excluded(v) => Bound::Excluded(value(field.as_str(), timestamp, v)?),
            Bound::Unbounded => Bound::Unbounded,
          })
        };
        Self::Range { field: field.clone(), lower: bound(lower)?, upper: bound(upper)? }
      }
      Self::ReferenceIn { field, uids } => match descriptor.field(field) {
        Some(f) if f.is_reference() => {
          Self::ReferenceIn { field: field.clone(), uids: uids.clone() }
        }
        _ => {
          return Err(Error::validation(
            descriptor.entity(),
            field.as_str(),
            "is not a reference field",
          ));
        }
      },
      Self::All(parts) => Self::All(
        parts
          .iter()
          .map(|p| p.normalize(descriptor))
          .collect::<Result<_>>()?,
      ),
    })
  }

  /// Evaluate against a row in memory. Storage backends that can push the
  /// predicate down must agree with this.
  pub fn matches(&self, row: &Row) -> bool {
    match self {
      Self::Equals { field, value } => {
        row.field(field).is_some_and(|v| compare(&v, value) == Some(Ordering::Equal))
      }
      Self::InSet { field, values } => row.field(field).is_some_and(|v| {
        values.iter().any(|c| compare(&v, c) == Some(Ordering::Equal))
      }),
      Self::Range { field, lower, upper } => row.field(field).is_some_and(|v| {
        let above = match lower {
          Bound::Included(b) => matches!(compare(&v, b), Some(Ordering::Greater | Ordering::Equal)),
          Bound::Excluded(b) => compare(&v, b) == Some(Ordering::Greater),
          Bound::Unbounded => !v.is_null(),
        };
        let below = match upper {
          Bound::Included(b) => matches!(compare(&v, b), Some(Ordering::Less | Ordering::Equal)),
          Bound::Excluded(b) => compare(&v, b) == Some(Ordering::Less),
          Bound::Unbounded => !v.is_null(),
        };
        above && below
      }),
      Self::ReferenceIn { field, uids } => row
        .field(field)
        .and_then(|v| v.as_str().map(|s| uids.iter().any(|u| u == s)))
        .unwrap_or(false),
      Self::All(parts) => parts.iter().all(|p| p.matches(row)),
    }
  }
}

fn normalize_value(
  entity: &str,
  field: &str,
  timestamp: bool,
  value: &Value,
) -> Result<Value> {
  match value {
    Value::Array(_) | Value::Object(_) => {
      Err(Error::validation(entity, field, "cannot be compared with an array or object"))
    }
    Value::Null => Ok(Value::Null),
    v if timestamp => v
      .as_str()
      .and_then(parse_timestamp)
      .map(|dt| Value::String(encode_timestamp(dt)))
      .ok_or_else(|| {
        Error::validation(entity, field, format!("{v} is not an RFC 3339 timestamp"))
      }),
    v => Ok(v.clone()),
  }
}

/// SQL-like comparison: numbers with numbers, strings with strings, booleans
/// with booleans; anything involving `null` or mixed kinds is incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => {
      match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
      }
    }
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
    _ => None,
  }
}
