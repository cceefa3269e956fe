//! Batch results shared by both concurrency modes.

use crate::error::{FailureKind, TaskFailure};
use pricewatch_store::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Isolation boundary used for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    Threads,
    Processes,
}

impl ConcurrencyMode {
    pub const ALL: [ConcurrencyMode; 2] = [ConcurrencyMode::Threads, ConcurrencyMode::Processes];

    pub fn as_str(self) -> &'static str {
        match self {
            ConcurrencyMode::Threads => "threads",
            ConcurrencyMode::Processes => "processes",
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConcurrencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threads" | "thread" => Ok(ConcurrencyMode::Threads),
            "processes" | "process" => Ok(ConcurrencyMode::Processes),
            other => Err(format!(
                "unknown concurrency mode '{other}' (expected threads|processes)"
            )),
        }
    }
}

/// Outcome of one task: the materialised records, or the failure marker.
pub type TaskOutcome = Result<Vec<Record>, TaskFailure>;

/// Aggregate result of one `run_concurrent` batch.
///
/// `results` is in completion order. `success_count` counts the `Ok` entries;
/// a batch with `success_count < num_queries` is degraded, not absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub mode: ConcurrencyMode,
    pub num_workers: usize,
    /// Wall-clock seconds from pool creation through teardown.
    pub execution_time: f64,
    pub num_queries: usize,
    pub success_count: usize,
    pub results: Vec<TaskOutcome>,
}

impl ExecutionResult {
    pub(crate) fn from_outcomes(
        mode: ConcurrencyMode,
        num_workers: usize,
        execution_time: f64,
        results: Vec<TaskOutcome>,
    ) -> Self {
        let success_count = results.iter().filter(|r| r.is_ok()).count();
        Self {
            mode,
            num_workers,
            execution_time,
            num_queries: results.len(),
            success_count,
            results,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.num_queries - self.success_count
    }

    pub fn is_degraded(&self) -> bool {
        self.success_count < self.num_queries
    }

    pub fn throughput(&self) -> f64 {
        throughput(self.num_queries, self.execution_time)
    }

    /// Failure counts keyed by kind (kinds with no failures are omitted).
    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in self.results.iter().filter_map(|r| r.as_ref().err()) {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// An [`ExecutionResult`] with the coarse resource readings taken around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampledExecutionResult {
    #[serde(flatten)]
    pub execution: ExecutionResult,
    /// Mean of the before/after CPU percentage of the calling process.
    pub cpu_usage: f64,
    /// Mean of the before/after resident set size, in MiB.
    pub memory_mb: f64,
}

/// `num_queries / execution_time`, defined as `0` when no time elapsed.
pub fn throughput(num_queries: usize, execution_time: f64) -> f64 {
    if execution_time > 0.0 {
        num_queries as f64 / execution_time
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes() -> Vec<TaskOutcome> {
        vec![
            Ok(vec![]),
            Err(TaskFailure::connection("no such file")),
            Ok(vec![Record::new()]),
            Err(TaskFailure::timeout(std::time::Duration::from_secs(1))),
            Err(TaskFailure::connection("locked")),
        ]
    }

    #[test]
    fn counts_follow_outcomes() {
        let result = ExecutionResult::from_outcomes(ConcurrencyMode::Threads, 2, 0.5, outcomes());
        assert_eq!(result.num_queries, 5);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count(), 3);
        assert!(result.is_degraded());
        assert_eq!(result.throughput(), 10.0);

        let kinds = result.failures_by_kind();
        assert_eq!(kinds.get(&FailureKind::Connection), Some(&2));
        assert_eq!(kinds.get(&FailureKind::Timeout), Some(&1));
        assert!(!kinds.contains_key(&FailureKind::Query));
    }

    #[test]
    fn zero_elapsed_has_zero_throughput() {
        assert_eq!(throughput(12, 0.0), 0.0);
        assert_eq!(throughput(0, 0.0), 0.0);
        assert_eq!(throughput(12, 4.0), 3.0);
    }

    #[test]
    fn mode_parses_both_spellings() {
        assert_eq!("threads".parse::<ConcurrencyMode>().unwrap(), ConcurrencyMode::Threads);
        assert_eq!("Process".parse::<ConcurrencyMode>().unwrap(), ConcurrencyMode::Processes);
        assert!("fibers".parse::<ConcurrencyMode>().is_err());
        assert_eq!(
            serde_json::to_string(&ConcurrencyMode::Processes).unwrap(),
            "\"processes\""
        );
    }
}
