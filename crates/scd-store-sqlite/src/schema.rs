//! SQL schema for the SQLite store.
//!
//! Connection-wide settings run once per connection; each entity type then
//! gets its own table, generated from its descriptor. Everything is
//! idempotent thanks to `IF NOT EXISTS`.

use scd_core::descriptor::VersionDescriptor;

use crate::query::payload_path;

pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA user_version = 1;
";

/// DDL for one entity table and its indexes.
///
/// Rows are strictly append-only: no UPDATE or DELETE is ever issued. The
/// `UNIQUE (logical_id, version)` constraint is what version allocation
/// relies on, and doubles as the index for the max-version aggregate.
pub fn entity_ddl(descriptor: &VersionDescriptor) -> String {
  let table = descriptor.table();
  let mut ddl = format!(
    "
CREATE TABLE IF NOT EXISTS {table} (
    uid         TEXT PRIMARY KEY,
    logical_id  TEXT NOT NULL,
    version     INTEGER NOT NULL CHECK (version >= 1),
    payload     TEXT NOT NULL,   -- JSON object of business fields
    created_at  TEXT NOT NULL,   -- fixed-width RFC 3339 UTC; server-assigned
    UNIQUE (logical_id, version)
);

CREATE INDEX IF NOT EXISTS {table}_created_idx ON {table}(created_at);
"
  );

  for field in descriptor.queryable_fields() {
    ddl.push_str(&format!(
      "CREATE INDEX IF NOT EXISTS {table}_{name}_idx ON {table}({path});\n",
      name = field.name,
      path = payload_path(None, &field.name),
    ));
  }
  ddl
}
