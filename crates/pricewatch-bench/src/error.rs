//! Error taxonomy.
//!
//! [`BenchError`] is fatal and surfaces immediately: bad pool sizes, bad sweep
//! bounds, a catalog missing a requested query, broken configuration.
//! [`TaskFailure`] is the per-task failure marker: it is recorded in an
//! [`crate::ExecutionResult`] and never escapes `run_concurrent`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("pool size must be at least 1 (got {0})")]
    InvalidPoolSize(usize),

    #[error("sweep bounds must be positive (num_queries={num_queries}, max_pool_size={max_pool_size})")]
    InvalidSweepBounds {
        num_queries: usize,
        max_pool_size: usize,
    },

    #[error("unknown query '{0}'")]
    UnknownQuery(String),

    #[error("process mode requires a worker command")]
    MissingWorkerCommand,

    #[error("failed to build query catalog: {0}")]
    CatalogSetup(String),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;

/// Why a single task did not produce records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The query itself failed.
    Query,
    /// The task could not open its data-store connection.
    Connection,
    /// The task exceeded its per-task timeout.
    Timeout,
    /// The operation panicked.
    Panic,
    /// The worker process could not be spawned, died, or spoke garbage.
    Worker,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Query => "query",
            FailureKind::Connection => "connection",
            FailureKind::Timeout => "timeout",
            FailureKind::Panic => "panic",
            FailureKind::Worker => "worker",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} failure: {message}")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Query, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Connection, message)
    }

    pub fn timeout(limit: std::time::Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("task exceeded {:.3}s timeout", limit.as_secs_f64()),
        )
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Worker, message)
    }
}

impl From<pricewatch_store::StoreError> for TaskFailure {
    fn from(err: pricewatch_store::StoreError) -> Self {
        let kind = if err.is_connection() {
            FailureKind::Connection
        } else if err.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Query
        };
        TaskFailure::new(kind, err.to_string())
    }
}
