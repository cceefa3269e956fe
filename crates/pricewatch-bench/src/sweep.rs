//! Experiment sweep over `(mode, pool_size)` pairs.

use crate::error::{BenchError, Result};
use crate::executor::Executor;
use crate::query::QueryName;
use crate::result::{ConcurrencyMode, SampledExecutionResult};
use crate::sampler::{ResourceProbe, ResourceSampler, SysinfoProbe};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-task timeout used by the dashboard sweep.
pub const DEFAULT_PER_TASK_TIMEOUT: Duration = Duration::from_secs(15);

/// Tabular summary of one sampled batch. Per-task records are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRow {
    pub method: ConcurrencyMode,
    pub num_workers: usize,
    pub execution_time: f64,
    pub num_queries: usize,
    pub success_count: usize,
    pub throughput: f64,
    pub cpu_usage: f64,
    pub memory_mb: f64,
}

impl ExperimentRow {
    pub fn is_degraded(&self) -> bool {
        self.success_count < self.num_queries
    }
}

impl From<&SampledExecutionResult> for ExperimentRow {
    fn from(sampled: &SampledExecutionResult) -> Self {
        let execution = &sampled.execution;
        Self {
            method: execution.mode,
            num_workers: execution.num_workers,
            execution_time: execution.execution_time,
            num_queries: execution.num_queries,
            success_count: execution.success_count,
            throughput: execution.throughput(),
            cpu_usage: sampled.cpu_usage,
            memory_mb: sampled.memory_mb,
        }
    }
}

/// Rows in the order the sweep visited them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentTable {
    rows: Vec<ExperimentRow>,
}

impl ExperimentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<ExperimentRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: ExperimentRow) {
        self.rows.push(row);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn rows(&self) -> &[ExperimentRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for(&self, mode: ConcurrencyMode) -> impl Iterator<Item = &ExperimentRow> {
        self.rows.iter().filter(move |row| row.method == mode)
    }

    /// Rows with `success_count < num_queries`. They stay in the table.
    pub fn degraded_rows(&self) -> impl Iterator<Item = &ExperimentRow> {
        self.rows.iter().filter(|row| row.is_degraded())
    }
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub per_task_timeout: Option<Duration>,
    /// Modes visited, in order. Each one sweeps every pool size ascending.
    pub modes: Vec<ConcurrencyMode>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            per_task_timeout: Some(DEFAULT_PER_TASK_TIMEOUT),
            modes: ConcurrencyMode::ALL.to_vec(),
        }
    }
}

/// Drives every `(mode, pool_size)` pair through the sampler and executor.
pub struct ExperimentSweep<P: ResourceProbe = SysinfoProbe> {
    executor: Executor,
    sampler: ResourceSampler<P>,
    config: SweepConfig,
    table: ExperimentTable,
}

impl ExperimentSweep<SysinfoProbe> {
    pub fn new(executor: Executor, config: SweepConfig) -> Self {
        Self::with_sampler(executor, ResourceSampler::new(), config)
    }
}

impl<P: ResourceProbe> ExperimentSweep<P> {
    pub fn with_sampler(
        executor: Executor,
        sampler: ResourceSampler<P>,
        config: SweepConfig,
    ) -> Self {
        Self {
            executor,
            sampler,
            config,
            table: ExperimentTable::new(),
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn table(&self) -> &ExperimentTable {
        &self.table
    }

    /// Run the full sweep. Previous table contents are discarded first.
    pub fn run_sweep(
        &mut self,
        num_queries: usize,
        max_pool_size: usize,
    ) -> Result<&ExperimentTable> {
        if num_queries == 0 || max_pool_size == 0 {
            return Err(BenchError::InvalidSweepBounds {
                num_queries,
                max_pool_size,
            });
        }
        self.table.clear();

        let workload = QueryName::round_robin(num_queries);
        let timeout = self.config.per_task_timeout;
        let steps = self.config.modes.len() * max_pool_size;
        tracing::info!(num_queries, max_pool_size, steps, "starting sweep");

        for mode in self.config.modes.clone() {
            for pool_size in 1..=max_pool_size {
                let executor = &self.executor;
                let sampled = self
                    .sampler
                    .sample(|| executor.run_concurrent(&workload, mode, pool_size, timeout))?;
                let row = ExperimentRow::from(&sampled);
                if row.is_degraded() {
                    tracing::warn!(
                        %mode,
                        num_workers = pool_size,
                        success_count = row.success_count,
                        num_queries = row.num_queries,
                        "degraded sweep step"
                    );
                }
                self.table.push(row);
            }
        }
        tracing::info!(rows = self.table.len(), "sweep complete");
        Ok(&self.table)
    }
}
