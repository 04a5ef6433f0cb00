//! Compiling [`Predicate`]s into SQL.
//!
//! Field names have already been restricted to plain identifiers by the
//! descriptor builder and checked by [`Predicate::validate`], so they are
//! spliced into the SQL text; every value goes through a bound parameter.
//! Every comparison is guarded by the kind of the stored value so that
//! mixed-kind comparisons never match, the same as [`Predicate::matches`].

use std::ops::Bound;

use rusqlite::types::Value as SqlValue;
use scd_core::{predicate::Predicate, row::BUILTIN_FIELDS};
use serde_json::Value;

/// A SQL boolean expression plus its positional (`?`) parameters, in order.
#[derive(Debug)]
pub struct Fragment {
  pub sql:    String,
  pub params: Vec<SqlValue>,
}

/// `json_extract(<alias.>payload, '$.field')`.
pub fn payload_path(alias: Option<&str>, field: &str) -> String {
  match alias {
    Some(a) => format!("json_extract({a}.payload, '$.{field}')"),
    None => format!("json_extract(payload, '$.{field}')"),
  }
}

fn column(alias: &str, field: &str) -> String {
  if BUILTIN_FIELDS.contains(&field) {
    format!("{alias}.{field}")
  } else {
    payload_path(Some(alias), field)
  }
}

/// A JSON array parameter, for `IN (SELECT value FROM json_each(?))`.
pub fn json_list<T: serde::Serialize + ?Sized>(items: &T) -> serde_json::Result<SqlValue> {
  Ok(SqlValue::Text(serde_json::to_string(items)?))
}

fn to_sql(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    other => SqlValue::Text(other.to_string()),
  }
}

/// The comparable kinds of value. Values of different kinds never match
/// each other, the same as in [`Predicate::matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
  Number,
  Text,
  Bool,
}

impl Kind {
  /// `None` for null, arrays and objects, which match nothing.
  fn of(value: &Value) -> Option<Self> {
    match value {
      Value::Number(_) => Some(Self::Number),
      Value::String(_) => Some(Self::Text),
      Value::Bool(_) => Some(Self::Bool),
      _ => None,
    }
  }
}

/// A condition that holds only when `field` currently has `kind`.
///
/// Payload fields are checked with `json_type`, which tells booleans apart
/// from the integers `json_extract` turns them into. Built-in columns never
/// hold booleans.
fn kind_guard(alias: &str, field: &str, kind: Kind) -> String {
  if BUILTIN_FIELDS.contains(&field) {
    let col = format!("{alias}.{field}");
    return match kind {
      Kind::Number => format!("typeof({col}) IN ('integer', 'real')"),
      Kind::Text => format!("typeof({col}) = 'text'"),
      Kind::Bool => "0".into(),
    };
  }
  let json_type = format!("json_type({alias}.payload, '$.{field}')");
  match kind {
    Kind::Number => format!("{json_type} IN ('integer', 'real')"),
    Kind::Text => format!("{json_type} = 'text'"),
    Kind::Bool => format!("{json_type} IN ('true', 'false')"),
  }
}

/// Compile `predicate` against rows aliased as `alias`.
pub fn compile(predicate: &Predicate, alias: &str) -> serde_json::Result<Fragment> {
  let mut params = Vec::new();
  let sql = compile_into(predicate, alias, &mut params)?;
  Ok(Fragment { sql, params })
}

fn compile_into(
  predicate: &Predicate,
  alias: &str,
  params: &mut Vec<SqlValue>,
) -> serde_json::Result<String> {
  Ok(match predicate {
    Predicate::Equals { field, value } => {
      let Some(kind) = Kind::of(value) else {
        return Ok("0".into());
      };
      params.push(to_sql(value));
      format!(
        "({} AND {} = ?)",
        kind_guard(alias, field, kind),
        column(alias, field)
      )
    }
    Predicate::InSet { field, values } => {
      // One membership test per kind present, each behind its own guard.
      let expr = column(alias, field);
      let mut arms = Vec::new();
      for kind in [Kind::Number, Kind::Text, Kind::Bool] {
        let members: Vec<&Value> =
          values.iter().filter(|v| Kind::of(v) == Some(kind)).collect();
        if members.is_empty() {
          continue;
        }
        params.push(json_list(&members)?);
        arms.push(format!(
          "({} AND {expr} IN (SELECT value FROM json_each(?)))",
          kind_guard(alias, field, kind)
        ));
      }
      if arms.is_empty() {
        return Ok("0".into());
      }
      format!("({})", arms.join(" OR "))
    }
    Predicate::Range { field, lower, upper } => {
      let bounds: Vec<(&str, &Value)> = [(lower, ">=", ">"), (upper, "<=", "<")]
        .into_iter()
        .filter_map(|(bound, inclusive, exclusive)| match bound {
          Bound::Included(v) => Some((inclusive, v)),
          Bound::Excluded(v) => Some((exclusive, v)),
          Bound::Unbounded => None,
        })
        .collect();
      if bounds.iter().any(|(_, v)| Kind::of(v).is_none()) {
        return Ok("0".into());
      }
      let expr = column(alias, field);
      let mut parts = vec![format!("{expr} IS NOT NULL")];
      for (op, value) in bounds {
        if let Some(kind) = Kind::of(value) {
          parts.push(kind_guard(alias, field, kind));
        }
        parts.push(format!("{expr} {op} ?"));
        params.push(to_sql(value));
      }
      format!("({})", parts.join(" AND "))
    }
    Predicate::ReferenceIn { field, uids } => {
      if uids.is_empty() {
        return Ok("0".into());
      }
      params.push(json_list(uids)?);
      format!(
        "({} AND {} IN (SELECT value FROM json_each(?)))",
        kind_guard(alias, field, Kind::Text),
        column(alias, field)
      )
    }
    Predicate::All(parts) if parts.is_empty() => "1".into(),
    Predicate::All(parts) => {
      let compiled = parts
        .iter()
        .map(|p| compile_into(p, alias, params))
        .collect::<serde_json::Result<Vec<_>>>()?;
      format!("({})", compiled.join(" AND "))
    }
  })
}
