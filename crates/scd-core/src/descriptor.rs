//! Version descriptors: explicit schema metadata for one entity type.
//!
//! A descriptor is built once and handed to a
//! [`Repository`](crate::repository::Repository) at construction; there is no
//! global registry. It declares every payload field with its kind, whether
//! it may change between versions, whether it can be filtered on, and which
//! fields are pinned references to another entity's rows.

use std::sync::Arc;

use serde_json::Value;

use crate::{
  Error, Result,
  row::{BUILTIN_FIELDS, Payload, encode_timestamp, parse_timestamp},
};

// ─── Field kinds ─────────────────────────────────────────────────────────────

/// The JSON shape a payload field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  Text,
  Integer,
  /// Any JSON number; used for money and rates.
  Decimal,
  Boolean,
  /// RFC 3339 string.
  Timestamp,
  /// A row uid of the target entity.
  Reference,
}

impl FieldKind {
  fn accepts(self, value: &Value) -> bool {
    match self {
      Self::Text | Self::Reference => value.is_string(),
      Self::Integer => value.is_i64() || value.is_u64(),
      Self::Decimal => value.is_number(),
      Self::Boolean => value.is_boolean(),
      Self::Timestamp => {
        value.as_str().and_then(parse_timestamp).is_some()
      }
    }
  }

  fn describe(self) -> &'static str {
    match self {
      Self::Text => "a string",
      Self::Integer => "an integer",
      Self::Decimal => "a number",
      Self::Boolean => "a boolean",
      Self::Timestamp => "an RFC 3339 timestamp",
      Self::Reference => "a row uid",
    }
  }
}

// ─── Field ───────────────────────────────────────────────────────────────────

/// Declaration of a single payload field.
#[derive(Debug, Clone)]
pub struct Field {
  pub name:      String,
  pub kind:      FieldKind,
  /// May a later version carry a different value?
  pub mutable:   bool,
  /// May predicates filter on it? Storage backends index these.
  pub queryable: bool,
  /// May the value be JSON `null` or absent?
  pub optional:  bool,
  pub default:   Option<Value>,
  /// Closed set of allowed values (status choices and the like).
  pub choices:   Vec<Value>,
  /// For [`FieldKind::Reference`]: the entity whose rows are pointed at.
  pub target:    Option<Arc<VersionDescriptor>>,
}

impl Field {
  fn new(name: &str, kind: FieldKind) -> Self {
    Self {
      name: name.to_owned(),
      kind,
      mutable: true,
      queryable: false,
      optional: false,
      default: None,
      choices: Vec::new(),
      target: None,
    }
  }

  pub fn text(name: &str) -> Self { Self::new(name, FieldKind::Text) }

  pub fn integer(name: &str) -> Self { Self::new(name, FieldKind::Integer) }

  pub fn decimal(name: &str) -> Self { Self::new(name, FieldKind::Decimal) }

  pub fn boolean(name: &str) -> Self { Self::new(name, FieldKind::Boolean) }

  pub fn timestamp(name: &str) -> Self {
    Self::new(name, FieldKind::Timestamp)
  }

  /// A pinned reference to a specific row of `target`. References are always
  /// queryable so that chained lookups can filter on them.
  pub fn reference(name: &str, target: &Arc<VersionDescriptor>) -> Self {
    Self {
      queryable: true,
      target: Some(Arc::clone(target)),
      ..Self::new(name, FieldKind::Reference)
    }
  }

  pub fn immutable(mut self) -> Self {
    self.mutable = false;
    self
  }

  pub fn queryable(mut self) -> Self {
    self.queryable = true;
    self
  }

  pub fn optional(mut self) -> Self {
    self.optional = true;
    self
  }

  pub fn default_value(mut self, value: impl Into<Value>) -> Self {
    self.default = Some(value.into());
    self
  }

  pub fn one_of<I, V>(mut self, choices: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
  {
    self.choices = choices.into_iter().map(Into::into).collect();
    self
  }

  pub fn is_reference(&self) -> bool { self.kind == FieldKind::Reference }

  /// Timestamps are stored in one fixed-width form so that string ranges
  /// over them follow time order.
  fn canonical(&self, value: Value) -> Value {
    match (self.kind, value.as_str().and_then(parse_timestamp)) {
      (FieldKind::Timestamp, Some(dt)) => Value::String(encode_timestamp(dt)),
      _ => value,
    }
  }

  fn check_value(&self, entity: &str, value: &Value) -> Result<()> {
    if value.is_null() {
      if self.optional {
        return Ok(());
      }
      return Err(Error::validation(entity, &self.name, "must not be null"));
    }
    if !self.kind.accepts(value) {
      return Err(Error::validation(
        entity,
        &self.name,
        format!("expected {}, got {value}", self.kind.describe()),
      ));
    }
    if !self.choices.is_empty() && !self.choices.contains(value) {
      return Err(Error::validation(
        entity,
        &self.name,
        format!("{value} is not one of {}", Value::from(self.choices.clone())),
      ));
    }
    Ok(())
  }
}

// ─── Descriptor ──────────────────────────────────────────────────────────────

/// Schema metadata for one versioned entity type.
#[derive(Debug, Clone)]
pub struct VersionDescriptor {
  entity: String,
  table:  String,
  fields: Vec<Field>,
}

impl VersionDescriptor {
  /// Start describing an entity. `entity` is the name used in errors, logs,
  /// and generated ids; `table` is where a storage backend keeps its rows.
  pub fn builder(entity: &str, table: &str) -> DescriptorBuilder {
    DescriptorBuilder {
      entity: entity.to_owned(),
      table:  table.to_owned(),
      fields: Vec::new(),
    }
  }

  pub fn entity(&self) -> &str { &self.entity }

  pub fn table(&self) -> &str { &self.table }

  pub fn fields(&self) -> &[Field] { &self.fields }

  pub fn field(&self, name: &str) -> Option<&Field> {
    self.fields.iter().find(|f| f.name == name)
  }

  /// Fields a storage backend should index.
  pub fn queryable_fields(&self) -> impl Iterator<Item = &Field> {
    self.fields.iter().filter(|f| f.queryable)
  }

  pub fn reference_fields(&self) -> impl Iterator<Item = &Field> {
    self.fields.iter().filter(|f| f.is_reference())
  }

  /// Built-in columns plus fields declared queryable.
  pub fn is_queryable(&self, name: &str) -> bool {
    BUILTIN_FIELDS.contains(&name)
      || self.field(name).is_some_and(|f| f.queryable)
  }

  /// Complete and check the payload for a brand-new entity: defaults are
  /// filled in, then every required field must be present.
  pub fn prepare_initial(&self, mut payload: Payload) -> Result<Payload> {
    self.reject_unknown(&payload)?;
    for field in &self.fields {
      if !payload.contains_key(&field.name) {
        if let Some(default) = &field.default {
          payload.insert(field.name.clone(), default.clone());
        } else if field.optional {
          payload.insert(field.name.clone(), Value::Null);
        } else {
          return Err(Error::validation(&self.entity, &field.name, "is required"));
        }
      }
      if let Some(value) = payload.remove(&field.name) {
        field.check_value(&self.entity, &value)?;
        payload.insert(field.name.clone(), field.canonical(value));
      }
    }
    Ok(payload)
  }

  /// Check a partial payload against the current version and produce the
  /// merged payload of the next version. Unspecified fields carry forward.
  pub fn merge_update(&self, current: &Payload, changes: &Payload) -> Result<Payload> {
    self.reject_unknown(changes)?;
    let mut merged = current.clone();
    for (name, value) in changes {
      // `reject_unknown` guarantees the lookup succeeds.
      let Some(field) = self.field(name) else { continue };
      field.check_value(&self.entity, value)?;
      let value = field.canonical(value.clone());
      if !field.mutable && current.get(name) != Some(&value) {
        return Err(Error::validation(
          &self.entity,
          name,
          "is immutable across versions",
        ));
      }
      merged.insert(name.clone(), value);
    }
    Ok(merged)
  }

  /// Reference fields set to a non-null uid in `payload`, paired with the
  /// entity they must point into.
  pub fn references<'p>(
    &'p self,
    payload: &'p Payload,
  ) -> impl Iterator<Item = (&'p Field, &'p str)> + 'p {
    self.reference_fields().filter_map(move |field| {
      payload
        .get(&field.name)
        .and_then(Value::as_str)
        .map(|uid| (field, uid))
    })
  }

  fn reject_unknown(&self, payload: &Payload) -> Result<()> {
    match payload.keys().find(|k| self.field(k).is_none()) {
      Some(unknown) => Err(Error::validation(
        &self.entity,
        unknown.as_str(),
        "is not a declared field",
      )),
      None => Ok(()),
    }
  }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DescriptorBuilder {
  entity: String,
  table:  String,
  fields: Vec<Field>,
}

impl DescriptorBuilder {
  pub fn field(mut self, field: Field) -> Self {
    self.fields.push(field);
    self
  }

  /// Validate names and produce a shareable descriptor.
  ///
  /// Entity, table, and field names end up inside SQL identifiers and JSON
  /// paths, so they are restricted to `[a-z_][a-z0-9_]*`.
  pub fn build(self) -> Result<Arc<VersionDescriptor>> {
    check_identifier(&self.entity, "entity", &self.entity)?;
    check_identifier(&self.entity, "table", &self.table)?;
    for (i, field) in self.fields.iter().enumerate() {
      check_identifier(&self.entity, &field.name, &field.name)?;
      if BUILTIN_FIELDS.contains(&field.name.as_str()) {
        return Err(Error::validation(
          &self.entity,
          &field.name,
          "shadows a built-in column",
        ));
      }
      if self.fields[..i].iter().any(|f| f.name == field.name) {
        return Err(Error::validation(&self.entity, &field.name, "declared twice"));
      }
      if let Some(default) = &field.default {
        field.check_value(&self.entity, default)?;
      }
    }
    Ok(Arc::new(VersionDescriptor {
      entity: self.entity,
      table:  self.table,
      fields: self.fields,
    }))
  }
}

fn check_identifier(entity: &str, what: &str, name: &str) -> Result<()> {
  let mut chars = name.chars();
  let head_ok = chars
    .next()
    .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
  if head_ok && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
    Ok(())
  } else {
    Err(Error::validation(
      entity,
      what,
      format!("{name:?} is not a valid identifier"),
    ))
  }
}
