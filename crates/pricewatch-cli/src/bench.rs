//! `bench` commands and the hidden `worker` entry point.
//!
//! Reports follow the `key=value` style of the other commands; `--json`
//! prints a machine-readable report on stdout instead.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use pricewatch_bench::config::timeout_from_secs;
use pricewatch_bench::{
    select_optimal, BenchConfig, ConcurrencyMode, Executor, ExperimentRow, ExperimentSweep,
    ExperimentTable, FailureKind, OptimalParameters, OptimalPoint, QueryName, ResourceSampler,
    SqliteCatalogProvider, SweepConfig, Worker, WorkerCommand,
};
use pricewatch_store::analytics::DEFAULT_TOP_PRODUCTS_LIMIT;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::DbArgs;

#[derive(Subcommand)]
pub enum BenchCommands {
    /// One sampled batch: `--queries` tasks on `--workers` threads or processes.
    Run {
        #[command(flatten)]
        target: DbArgs,

        /// Concurrency mode: threads | processes.
        #[arg(long, default_value = "threads")]
        mode: ConcurrencyMode,

        /// Pool size (defaults to `max_pool_size` from the config).
        #[arg(long)]
        workers: Option<usize>,

        /// Number of queries, cycling the catalog (defaults to `num_queries`).
        #[arg(long)]
        queries: Option<usize>,

        /// Per-task timeout in seconds (0 disables).
        #[arg(long)]
        timeout_secs: Option<f64>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Sweep pool sizes `1..=max-workers` for each mode and pick the optimum.
    Sweep {
        #[command(flatten)]
        target: DbArgs,

        /// Number of queries per batch (defaults to `num_queries`).
        #[arg(long)]
        queries: Option<usize>,

        /// Largest pool size (defaults to `max_pool_size`).
        #[arg(long)]
        max_workers: Option<usize>,

        /// Per-task timeout in seconds (0 disables).
        #[arg(long)]
        timeout_secs: Option<f64>,

        /// Modes to sweep, in order.
        #[arg(long, value_delimiter = ',', default_value = "threads,processes")]
        modes: Vec<ConcurrencyMode>,

        /// Write the JSON report to this path.
        #[arg(long)]
        out_json: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long, env = "PRICEWATCH_DB")]
    pub db: PathBuf,

    #[arg(long, default_value_t = DEFAULT_TOP_PRODUCTS_LIMIT)]
    pub top_products_limit: usize,

    /// Sleep before each task (test hook for driver-side timeouts).
    #[arg(long, env = "PRICEWATCH_WORKER_FAKE_DELAY_MS", default_value_t = 0, hide = true)]
    pub fake_delay_ms: u64,
}

#[derive(Debug, Serialize)]
struct RunReport {
    row: ExperimentRow,
    failures_by_kind: BTreeMap<FailureKind, usize>,
}

#[derive(Debug, Serialize)]
struct SweepReport<'a> {
    rows: &'a ExperimentTable,
    optimal: OptimalParameters,
}

pub fn cmd_bench(command: BenchCommands, config: &BenchConfig) -> Result<()> {
    match command {
        BenchCommands::Run {
            target,
            mode,
            workers,
            queries,
            timeout_secs,
            json,
        } => {
            let db = target.resolve(config)?;
            let executor = build_executor(&db, config)?;
            let pool_size = workers.unwrap_or(config.max_pool_size);
            let workload = QueryName::round_robin(queries.unwrap_or(config.num_queries));
            let timeout = resolve_timeout(timeout_secs, config)?;

            let sampled = ResourceSampler::new()
                .sample(|| executor.run_concurrent(&workload, mode, pool_size, timeout))?;
            let report = RunReport {
                row: ExperimentRow::from(&sampled),
                failures_by_kind: sampled.execution.failures_by_kind(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_run(&report, timeout);
            }
            Ok(())
        }
        BenchCommands::Sweep {
            target,
            queries,
            max_workers,
            timeout_secs,
            modes,
            out_json,
            json,
        } => {
            let db = target.resolve(config)?;
            let executor = build_executor(&db, config)?;
            let num_queries = queries.unwrap_or(config.num_queries);
            let max_pool_size = max_workers.unwrap_or(config.max_pool_size);
            let sweep_config = SweepConfig {
                per_task_timeout: resolve_timeout(timeout_secs, config)?,
                modes,
            };

            let mut sweep = ExperimentSweep::new(executor, sweep_config);
            let table = sweep.run_sweep(num_queries, max_pool_size)?;
            let report = SweepReport {
                rows: table,
                optimal: select_optimal(table),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sweep(&report, num_queries, max_pool_size);
            }
            if let Some(out) = out_json {
                fs::write(&out, serde_json::to_string_pretty(&report)?)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
            }
            Ok(())
        }
    }
}

pub fn cmd_worker(args: &WorkerArgs) -> Result<()> {
    let provider =
        SqliteCatalogProvider::new(&args.db).with_top_products_limit(args.top_products_limit);
    let worker = Worker::new(&provider).with_fake_delay(Duration::from_millis(args.fake_delay_ms));
    let stdin = io::stdin();
    let stdout = io::stdout();
    let served = worker.serve(stdin.lock(), BufWriter::new(stdout.lock()))?;
    tracing::debug!(served, pid = std::process::id(), "worker exiting");
    Ok(())
}

fn build_executor(db: &Path, config: &BenchConfig) -> Result<Executor> {
    let provider =
        SqliteCatalogProvider::new(db).with_top_products_limit(config.top_products_limit);
    let exe = std::env::current_exe().context("failed to locate the pricewatch binary")?;
    Ok(Executor::new(Arc::new(provider)).with_worker_command(
        WorkerCommand::pricewatch_worker(exe, db, config.top_products_limit),
    ))
}

pub(crate) fn resolve_timeout(
    flag: Option<f64>,
    config: &BenchConfig,
) -> Result<Option<Duration>> {
    match flag {
        Some(secs) => timeout_from_secs(secs)
            .with_context(|| format!("--timeout-secs {secs} is out of range")),
        None => Ok(config.per_task_timeout()),
    }
}

fn format_timeout(timeout: Option<Duration>) -> String {
    timeout
        .map(|t| format!("{:.3}s", t.as_secs_f64()))
        .unwrap_or_else(|| "none".to_string())
}

fn print_run(report: &RunReport, timeout: Option<Duration>) {
    let row = &report.row;
    println!("{}", "bench run".bold());
    println!(
        "  mode={} workers={} queries={} timeout={}",
        row.method,
        row.num_workers,
        row.num_queries,
        format_timeout(timeout)
    );
    println!(
        "  execution_time={:.3}s ({:.1} queries/sec)",
        row.execution_time, row.throughput
    );
    println!("  success={}/{}{}", row.success_count, row.num_queries, degraded_marker(row));
    for (kind, count) in &report.failures_by_kind {
        println!("  failures.{kind}={count}");
    }
    println!("  cpu_usage={:.1}% memory_mb={:.1}", row.cpu_usage, row.memory_mb);
}

fn print_sweep(report: &SweepReport<'_>, num_queries: usize, max_pool_size: usize) {
    println!("{}", "bench sweep".bold());
    println!("  queries={num_queries} max_workers={max_pool_size}");
    println!(
        "  {:<10} {:>7} {:>10} {:>9} {:>12} {:>7} {:>9}",
        "method", "workers", "time_s", "success", "queries/sec", "cpu_%", "mem_mb"
    );
    for row in report.rows.rows() {
        println!(
            "  {:<10} {:>7} {:>10.3} {:>9} {:>12.1} {:>7.1} {:>9.1}{}",
            row.method.to_string(),
            row.num_workers,
            row.execution_time,
            format!("{}/{}", row.success_count, row.num_queries),
            row.throughput,
            row.cpu_usage,
            row.memory_mb,
            degraded_marker(row)
        );
    }
    for mode in ConcurrencyMode::ALL {
        print_optimal(mode, report.optimal.for_mode(mode));
    }
}

fn print_optimal(mode: ConcurrencyMode, point: &OptimalPoint) {
    if point.is_placeholder() {
        println!("  optimal_{mode}=n/a");
        return;
    }
    println!(
        "  optimal_{mode}={} ({:.3}s, {:.1} queries/sec)",
        point.num_workers.to_string().green().bold(),
        point.execution_time,
        point.throughput
    );
}

fn degraded_marker(row: &ExperimentRow) -> String {
    if row.is_degraded() {
        format!(" {}", "degraded".yellow())
    } else {
        String::new()
    }
}
