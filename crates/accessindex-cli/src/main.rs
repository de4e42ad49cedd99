//! `accessindex` — compute and inspect accessibility scores.
//!
//! Reads `config.toml` (or the path given with `--config`), which points at
//! the SQLite database and the category-registry TOML:
//!
//! ```toml
//! database = "accessindex.db"
//! registry = "registry.toml"
//! ```
//!
//! # Usage
//!
//! ```
//! accessindex compute --area 6f2cb9c2-02b0-4e43-b27f-a43e231bb3c5
//! accessindex compute-all --jobs 8 --adjust
//! accessindex show --area 6f2cb9c2-02b0-4e43-b27f-a43e231bb3c5
//! accessindex check
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use accessindex_core::{config::RegistryConfig, registry::CategoryRegistry};
use accessindex_store_sqlite::{ComputeOptions, SqliteScoreStore, compute_and_persist};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "accessindex", about = "Accessibility score computation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Compute and persist a score run for one admin area.
  Compute {
    /// Admin area id.
    #[arg(long)]
    area: Uuid,

    /// Weight top-level branches by data quality.
    #[arg(long)]
    adjust: bool,
  },

  /// Compute a run for every admin area with facility data.
  ComputeAll {
    /// Concurrent computations.
    #[arg(long, default_value_t = 4)]
    jobs: usize,

    /// Weight top-level branches by data quality.
    #[arg(long)]
    adjust: bool,
  },

  /// Print the latest persisted run for one admin area.
  Show {
    /// Admin area id.
    #[arg(long)]
    area: Uuid,
  },

  /// Validate the category registry without touching the database.
  Check,
}

// ─── Config file ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ConfigFile {
  database: PathBuf,
  registry: PathBuf,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let raw = std::fs::read_to_string(&cli.config)
    .with_context(|| format!("reading config file {}", cli.config.display()))?;
  let config: ConfigFile = toml::from_str(&raw).context("parsing config file")?;
  let registry = load_registry(&config.registry)?;

  if let Command::Check = cli.command {
    registry
      .check_weight_sums(1e-10)
      .context("registry weight sums")?;
    println!("registry ok");
    return Ok(());
  }

  let store = SqliteScoreStore::open(&config.database)
    .await
    .with_context(|| format!("opening database {}", config.database.display()))?;

  match cli.command {
    Command::Compute { area, adjust } => {
      let options = ComputeOptions { adjust_weights_by_data_quality: adjust };
      let (tree, run_id) = compute_and_persist(&store, &registry, area, &options)
        .await
        .with_context(|| format!("computing scores for area {area}"))?;

      tracing::info!(%run_id, "run persisted");
      println!("{}", serde_json::to_string_pretty(&tree)?);
    }

    Command::ComputeAll { jobs, adjust } => {
      compute_all(store, registry, jobs.max(1), adjust).await?;
    }

    Command::Show { area } => {
      let run = store
        .latest_run(area)
        .await?
        .with_context(|| format!("no committed score run for area {area}"))?;

      println!(
        "run {} computed {} score {} data quality {}",
        run.run_id,
        run.computed_at.to_rfc3339(),
        run.score.map_or("null".into(), |s| s.to_string()),
        run.data_quality,
      );
      for node in store.fetch_run_nodes(run.run_id).await? {
        println!(
          "  {:<20} {:<30} score {:<6} quality {}",
          format!("{:?}", node.level),
          node.node_id,
          node.score.map_or("null".into(), |s| s.to_string()),
          node.data_quality.map_or("null".into(), |q| q.to_string()),
        );
      }
    }

    Command::Check => unreachable!("handled above"),
  }

  Ok(())
}

fn load_registry(path: &PathBuf) -> anyhow::Result<CategoryRegistry> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading registry file {}", path.display()))?;
  let config: RegistryConfig = toml::from_str(&raw).context("parsing registry file")?;
  config.build().context("building category registry")
}

/// Run every area's computation with bounded concurrency.
async fn compute_all(
  store: SqliteScoreStore,
  registry: CategoryRegistry,
  jobs: usize,
  adjust: bool,
) -> anyhow::Result<()> {
  let areas = store.list_admin_areas().await?;
  tracing::info!(areas = areas.len(), jobs, "computing all areas");

  let registry = Arc::new(registry);
  let semaphore = Arc::new(Semaphore::new(jobs));
  let options = ComputeOptions { adjust_weights_by_data_quality: adjust };

  let mut handles = Vec::with_capacity(areas.len());
  for area in areas {
    let store = store.clone();
    let registry = Arc::clone(&registry);
    let permit = Arc::clone(&semaphore).acquire_owned().await?;

    handles.push(tokio::spawn(async move {
      let _permit = permit;
      let result = compute_and_persist(&store, &registry, area, &options).await;
      (area, result)
    }));
  }

  let mut failures = 0usize;
  for handle in handles {
    let (area, result) = handle.await?;
    match result {
      Ok((tree, _)) => {
        tracing::info!(%area, score = ?tree.score, "area scored");
      }
      Err(error) => {
        failures += 1;
        tracing::error!(%area, %error, "area failed");
      }
    }
  }

  if failures > 0 {
    anyhow::bail!("{failures} area(s) failed");
  }
  Ok(())
}
