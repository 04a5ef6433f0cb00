//! Layered settings: defaults, then an optional TOML file, then `SCD_*`
//! environment variables (nested keys use `__`, e.g.
//! `SCD_RETRY__MAX_ATTEMPTS=3`).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use scd_core::controller::RetryPolicy;
use scd_store_sqlite::StoreOptions;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:      PathBuf,
  pub busy_timeout_ms: u64,
  pub retry:           RetrySettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:      PathBuf::from("scd.sqlite3"),
      busy_timeout_ms: 5_000,
      retry:           RetrySettings::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
  pub max_attempts:   u32,
  pub base_delay_ms:  u64,
  pub max_delay_ms:   u64,
  pub max_elapsed_ms: Option<u64>,
}

impl Default for RetrySettings {
  fn default() -> Self {
    let policy = RetryPolicy::default();
    Self {
      max_attempts:   policy.max_attempts,
      base_delay_ms:  policy.base_delay.as_millis() as u64,
      max_delay_ms:   policy.max_delay.as_millis() as u64,
      max_elapsed_ms: policy.max_elapsed.map(|d| d.as_millis() as u64),
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings: Self = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("SCD")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise Settings")?;

    Ok(Self { store_path: expand_tilde(&settings.store_path), ..settings })
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.retry.max_attempts,
      base_delay:   Duration::from_millis(self.retry.base_delay_ms),
      max_delay:    Duration::from_millis(self.retry.max_delay_ms),
      max_elapsed:  self.retry.max_elapsed_ms.map(Duration::from_millis),
    }
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions { busy_timeout: Duration::from_millis(self.busy_timeout_ms) }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
