//! Benchmark configuration file (JSON).
//!
//! Every field is optional in the file; missing fields take the dashboard
//! defaults. Command-line flags override file values.

use crate::error::{BenchError, Result};
use crate::sweep::SweepConfig;
use pricewatch_store::analytics::DEFAULT_TOP_PRODUCTS_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, TryFromFloatSecsError};

pub const DEFAULT_NUM_QUERIES: usize = 50;
pub const DEFAULT_MAX_POOL_SIZE: usize = 10;
pub const DEFAULT_PER_TASK_TIMEOUT_SECS: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub database: Option<PathBuf>,
    pub num_queries: usize,
    pub max_pool_size: usize,
    /// `0` disables the per-task timeout.
    pub per_task_timeout_secs: f64,
    pub top_products_limit: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            database: None,
            num_queries: DEFAULT_NUM_QUERIES,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            per_task_timeout_secs: DEFAULT_PER_TASK_TIMEOUT_SECS,
            top_products_limit: DEFAULT_TOP_PRODUCTS_LIMIT,
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_json::from_str(&text).map_err(|e| BenchError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: &str| BenchError::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if !self.per_task_timeout_secs.is_finite() || self.per_task_timeout_secs < 0.0 {
            return Err(invalid("per_task_timeout_secs must be a non-negative number"));
        }
        if timeout_from_secs(self.per_task_timeout_secs).is_err() {
            return Err(invalid("per_task_timeout_secs is too large"));
        }
        if self.top_products_limit == 0 {
            return Err(invalid("top_products_limit must be at least 1"));
        }
        Ok(())
    }

    /// An out-of-range value (only reachable by skipping `load`) means no timeout.
    pub fn per_task_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.per_task_timeout_secs).unwrap_or(None)
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            per_task_timeout: self.per_task_timeout(),
            ..SweepConfig::default()
        }
    }
}

/// Seconds to an optional timeout; zero, negative or non-finite means none.
///
/// Fails when `secs` is finite but does not fit in a `Duration`.
pub fn timeout_from_secs(
    secs: f64,
) -> std::result::Result<Option<Duration>, TryFromFloatSecsError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs).map(Some)
}
