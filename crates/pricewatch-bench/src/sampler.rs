//! Coarse CPU/memory sampling around one batch.

use crate::error::Result;
use crate::result::{ExecutionResult, SampledExecutionResult};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// One reading of the calling process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// CPU usage since the previous refresh, in percent (may exceed 100 on
    /// multi-core hosts).
    pub cpu_percent: f32,
    /// Resident set size in bytes.
    pub memory_bytes: u64,
}

pub trait ResourceProbe {
    fn snapshot(&mut self) -> ResourceSnapshot;
}

/// Reads the current process through `sysinfo`.
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
    refresh_kind: ProcessRefreshKind,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let refresh_kind = ProcessRefreshKind::new().with_cpu().with_memory();
        let mut system = System::new();
        // First refresh sets the CPU baseline; cpu_usage() is 0 until the second.
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh_kind);
        Self {
            system,
            pid,
            refresh_kind,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn snapshot(&mut self) -> ResourceSnapshot {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            self.refresh_kind,
        );
        match self.system.process(self.pid) {
            Some(process) => ResourceSnapshot {
                cpu_percent: process.cpu_usage(),
                memory_bytes: process.memory(),
            },
            None => {
                tracing::warn!(pid = %self.pid, "current process not visible to sysinfo");
                ResourceSnapshot::default()
            }
        }
    }
}

/// Wraps a batch with one snapshot before and one after.
pub struct ResourceSampler<P = SysinfoProbe> {
    probe: P,
}

impl ResourceSampler<SysinfoProbe> {
    pub fn new() -> Self {
        Self::with_probe(SysinfoProbe::new())
    }
}

impl Default for ResourceSampler<SysinfoProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ResourceProbe> ResourceSampler<P> {
    pub fn with_probe(probe: P) -> Self {
        Self { probe }
    }

    /// Run `op` between two snapshots; `cpu_usage` and `memory_mb` are the
    /// means of the pair. Errors from `op` pass through unchanged.
    pub fn sample<F>(&mut self, op: F) -> Result<SampledExecutionResult>
    where
        F: FnOnce() -> Result<ExecutionResult>,
    {
        let before = self.probe.snapshot();
        let execution = op()?;
        let after = self.probe.snapshot();

        let cpu_usage = (f64::from(before.cpu_percent) + f64::from(after.cpu_percent)) / 2.0;
        let memory_mb =
            (before.memory_bytes as f64 + after.memory_bytes as f64) / 2.0 / BYTES_PER_MIB;
        tracing::debug!(
            cpu_before = before.cpu_percent,
            cpu_after = after.cpu_percent,
            rss_before = before.memory_bytes,
            rss_after = after.memory_bytes,
            "sampled batch"
        );
        Ok(SampledExecutionResult {
            execution,
            cpu_usage,
            memory_mb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::result::ConcurrencyMode;

    /// Replays a fixed sequence of snapshots.
    struct Scripted(std::vec::IntoIter<ResourceSnapshot>);

    impl ResourceProbe for Scripted {
        fn snapshot(&mut self) -> ResourceSnapshot {
            self.0.next().unwrap_or_default()
        }
    }

    fn batch() -> ExecutionResult {
        ExecutionResult::from_outcomes(
            ConcurrencyMode::Threads,
            2,
            0.25,
            vec![Ok(vec![]), Ok(vec![])],
        )
    }

    #[test]
    fn reports_mean_of_before_and_after() {
        let probe = Scripted(
            vec![
                ResourceSnapshot { cpu_percent: 10.0, memory_bytes: 100 * 1024 * 1024 },
                ResourceSnapshot { cpu_percent: 30.0, memory_bytes: 140 * 1024 * 1024 },
            ]
            .into_iter(),
        );
        let sampled = ResourceSampler::with_probe(probe).sample(|| Ok(batch())).unwrap();
        assert_eq!(sampled.cpu_usage, 20.0);
        assert_eq!(sampled.memory_mb, 120.0);
        assert_eq!(sampled.execution.num_queries, 2);
    }

    #[test]
    fn errors_pass_through() {
        let probe = Scripted(Vec::new().into_iter());
        let err = ResourceSampler::with_probe(probe)
            .sample(|| Err(BenchError::InvalidPoolSize(0)))
            .unwrap_err();
        assert!(matches!(err, BenchError::InvalidPoolSize(0)));
    }

    #[test]
    fn sysinfo_sees_this_process() {
        let mut probe = SysinfoProbe::new();
        let snapshot = probe.snapshot();
        assert!(snapshot.memory_bytes > 0);
        assert!(snapshot.cpu_percent >= 0.0);
    }
}
