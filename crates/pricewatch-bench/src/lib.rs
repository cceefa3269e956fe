//! Pricewatch concurrency benchmark engine
//!
//! Runs batches of the six analytics queries against the store with a pool of
//! OS threads or a pool of OS worker processes, and characterises scaling:
//! - Query catalog: closed `QueryName` enum mapped to operations (`catalog`, `query`)
//! - Worker-pool executor, fail-soft, completion-order results (`executor`, `process`)
//! - Process-mode wire protocol and worker loop (`protocol`, `worker`)
//! - Before/after CPU and memory sampling (`sampler`)
//! - `(mode, pool_size)` sweep and optimum selection (`sweep`, `optimal`)

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod optimal;
pub mod process;
pub mod protocol;
pub mod query;
pub mod result;
pub mod sampler;
pub mod sweep;
pub mod worker;

pub use catalog::{CatalogProvider, QueryCatalog, QueryContext, QueryOp, SqliteCatalogProvider};
pub use config::BenchConfig;
pub use error::{BenchError, FailureKind, Result, TaskFailure};
pub use executor::Executor;
pub use optimal::{select_optimal, OptimalParameters, OptimalPoint};
pub use process::WorkerCommand;
pub use query::QueryName;
pub use result::{throughput, ConcurrencyMode, ExecutionResult, SampledExecutionResult, TaskOutcome};
pub use sampler::{ResourceProbe, ResourceSampler, ResourceSnapshot, SysinfoProbe};
pub use sweep::{ExperimentRow, ExperimentSweep, ExperimentTable, SweepConfig};
pub use worker::Worker;
