//! Pricewatch CLI
//!
//! Command-line entry point for the retail-price monitor's benchmark harness:
//! - Seeding an SQLite store with a synthetic catalog (`seed`)
//! - Running a single analytics query (`query`)
//! - Thread/process pool batches and sweeps with optimum selection (`bench`)
//! - The process-mode worker loop (`worker`, hidden)
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); stdout carries reports and,
//! in worker mode, protocol frames.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use pricewatch_bench::BenchConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod bench;
mod store;

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(
    author,
    version,
    about = "Pricewatch: parallel database-access benchmarks for the retail-price monitor"
)]
struct Cli {
    /// JSON benchmark configuration (`database`, `num_queries`, `max_pool_size`,
    /// `per_task_timeout_secs`, `top_products_limit`). Flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and fill the store with a deterministic synthetic catalog.
    Seed(store::SeedArgs),

    /// Run one analytics query and print its records as JSON.
    Query(store::QueryArgs),

    /// Thread/process pool benchmarks.
    Bench {
        #[command(subcommand)]
        command: bench::BenchCommands,
    },

    /// Process-mode worker: serve task frames on stdin/stdout until EOF.
    #[command(hide = true)]
    Worker(bench::WorkerArgs),
}

/// Database location shared by every command.
#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// SQLite database file (falls back to `database` in `--config`).
    #[arg(long, env = "PRICEWATCH_DB")]
    pub db: Option<PathBuf>,
}

impl DbArgs {
    pub fn resolve(&self, config: &BenchConfig) -> Result<PathBuf> {
        self.db
            .clone()
            .or_else(|| config.database.clone())
            .ok_or_else(|| {
                anyhow!("no database given (use --db, PRICEWATCH_DB or `database` in --config)")
            })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Seed(args) => store::cmd_seed(&args, &config),
        Commands::Query(args) => store::cmd_query(&args, &config),
        Commands::Bench { command } => bench::cmd_bench(command, &config),
        Commands::Worker(args) => bench::cmd_worker(&args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    match path {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(BenchConfig::default()),
    }
}
