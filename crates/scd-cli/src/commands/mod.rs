//! Subcommand implementations. Each returns the JSON document the binary
//! prints.

mod query;
mod report;
mod seed;

pub use query::{history, latest, update};
pub use report::{dashboard, spending};
pub use seed::{SeedOptions, seed};

use anyhow::bail;
use serde_json::Value;

/// Parse `field=value`. The value is read as JSON when it parses as JSON
/// (numbers, booleans, quoted strings) and as a bare string otherwise.
pub fn parse_assignment(arg: &str) -> anyhow::Result<(String, Value)> {
  let Some((field, raw)) = arg.split_once('=') else {
    bail!("expected field=value, got {arg:?}");
  };
  if field.is_empty() {
    bail!("missing field name in {arg:?}");
  }
  let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
  Ok((field.to_owned(), value))
}
