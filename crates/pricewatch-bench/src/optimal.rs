//! Optimal worker count per concurrency mode.

use crate::result::ConcurrencyMode;
use crate::sweep::{ExperimentRow, ExperimentTable};
use serde::{Deserialize, Serialize};

/// The selected row of one mode. All zeros when the mode has no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimalPoint {
    pub num_workers: usize,
    pub execution_time: f64,
    pub throughput: f64,
    pub num_queries: usize,
    pub success_count: usize,
}

impl OptimalPoint {
    pub fn is_placeholder(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&ExperimentRow> for OptimalPoint {
    fn from(row: &ExperimentRow) -> Self {
        Self {
            num_workers: row.num_workers,
            execution_time: row.execution_time,
            throughput: row.throughput,
            num_queries: row.num_queries,
            success_count: row.success_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimalParameters {
    pub optimal_threads: OptimalPoint,
    pub optimal_processes: OptimalPoint,
}

impl OptimalParameters {
    pub fn for_mode(&self, mode: ConcurrencyMode) -> &OptimalPoint {
        match mode {
            ConcurrencyMode::Threads => &self.optimal_threads,
            ConcurrencyMode::Processes => &self.optimal_processes,
        }
    }
}

/// Per mode, the first row with the minimum `execution_time`.
pub fn select_optimal(table: &ExperimentTable) -> OptimalParameters {
    OptimalParameters {
        optimal_threads: fastest(table, ConcurrencyMode::Threads),
        optimal_processes: fastest(table, ConcurrencyMode::Processes),
    }
}

fn fastest(table: &ExperimentTable, mode: ConcurrencyMode) -> OptimalPoint {
    table
        .rows_for(mode)
        .fold(None::<&ExperimentRow>, |best, row| match best {
            Some(best) if best.execution_time <= row.execution_time => Some(best),
            _ => Some(row),
        })
        .map(OptimalPoint::from)
        .unwrap_or_default()
}
