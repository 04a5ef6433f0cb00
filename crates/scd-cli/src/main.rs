//! `scd`: command-line access to a versioned record store.
//!
//! # Usage
//!
//! ```text
//! scd seed --jobs 20 --versions 4
//! scd latest job --where status=active --where company_id=comp_001
//! scd history job job_001
//! scd update job job_001 rate=45.5 status=paused
//! scd dashboard cont_001 --days 30
//! scd spending comp_001 --year 2024 --month 6
//! ```
//!
//! Settings come from `scd.toml` (or `--config`) and `SCD_*` environment
//! variables. Results are printed to stdout as JSON; logs go to stderr.

mod commands;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use settings::Settings;
use scd_core::catalog::{Catalog, Workforce};
use scd_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Versioned record store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "scd.toml")]
  config: PathBuf,

  /// SQLite database file; overrides `store_path` from the config.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Populate the store with deterministic sample data.
  Seed {
    #[arg(long, default_value_t = 3)]
    companies:   u32,
    #[arg(long, default_value_t = 5)]
    contractors: u32,
    #[arg(long, default_value_t = 10)]
    jobs:        u32,
    /// Upper bound on versions per job.
    #[arg(long, default_value_t = 3)]
    versions:    u32,
  },

  /// Latest version of every entity, optionally filtered.
  Latest {
    entity: String,
    /// `field=value` equality filter; repeatable.
    #[arg(long = "where", value_name = "FIELD=VALUE")]
    filters: Vec<String>,
  },

  /// Every version of one entity, oldest first.
  History { entity: String, logical_id: String },

  /// Append a new version with the given changes.
  Update {
    entity:      String,
    logical_id:  String,
    #[arg(required = true, value_name = "FIELD=VALUE")]
    assignments: Vec<String>,
  },

  /// A contractor's jobs, timelogs and payments.
  Dashboard {
    contractor_id: String,
    #[arg(long, default_value_t = 30)]
    days:          u32,
  },

  /// What a company paid in one calendar month.
  Spending {
    company_id: String,
    #[arg(long)]
    year:       i32,
    #[arg(long)]
    month:      u32,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut settings = Settings::load(&cli.config)?;
  if let Some(store) = cli.store {
    settings.store_path = store;
  }

  let catalog = Catalog::build().context("failed to build entity catalog")?;
  let store = SqliteStore::open_with(&settings.store_path, catalog.all(), &settings.store_options())
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  tracing::debug!(path = ?settings.store_path, "store opened");

  let workforce =
    Workforce::new(Arc::new(store), catalog).with_retry_policy(settings.retry_policy());

  let output = match cli.command {
    Command::Seed { companies, contractors, jobs, versions } => {
      let options = commands::SeedOptions { companies, contractors, jobs, versions };
      commands::seed(&workforce, options).await?
    }
    Command::Latest { entity, filters } => {
      commands::latest(&workforce, &entity, &filters).await?
    }
    Command::History { entity, logical_id } => {
      commands::history(&workforce, &entity, &logical_id).await?
    }
    Command::Update { entity, logical_id, assignments } => {
      commands::update(&workforce, &entity, &logical_id, &assignments).await?
    }
    Command::Dashboard { contractor_id, days } => {
      commands::dashboard(&workforce, &contractor_id, days).await?
    }
    Command::Spending { company_id, year, month } => {
      commands::spending(&workforce, &company_id, year, month).await?
    }
  };

  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}
