//! Worker-pool executor.
//!
//! `run_concurrent` submits every query as an independent task to a pool of
//! exactly `pool_size` workers and collects outcomes in completion order:
//! - threads: named scoped OS threads, one catalog per thread
//! - processes: one driver thread per slot, each owning a worker child (see
//!   [`crate::process`])
//!
//! Task failures are recorded, never propagated. Only configuration errors
//! escape as `Err`.

use crate::catalog::{CatalogProvider, QueryCatalog, QueryContext};
use crate::error::{BenchError, FailureKind, Result, TaskFailure};
use crate::process::{self, WorkerCommand};
use crate::query::QueryName;
use crate::result::{ConcurrencyMode, ExecutionResult, TaskOutcome};
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One queued unit of work.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Task {
    pub id: u64,
    pub query: QueryName,
}

pub struct Executor {
    provider: Arc<dyn CatalogProvider>,
    worker_command: Option<WorkerCommand>,
}

impl Executor {
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        Self {
            provider,
            worker_command: None,
        }
    }

    /// Command used to start process-mode workers.
    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    pub fn worker_command(&self) -> Option<&WorkerCommand> {
        self.worker_command.as_ref()
    }

    pub fn run_concurrent(
        &self,
        queries: &[QueryName],
        mode: ConcurrencyMode,
        pool_size: usize,
        per_task_timeout: Option<Duration>,
    ) -> Result<ExecutionResult> {
        if pool_size == 0 {
            return Err(BenchError::InvalidPoolSize(pool_size));
        }
        let worker_command = match mode {
            ConcurrencyMode::Threads => None,
            ConcurrencyMode::Processes => {
                Some(self.worker_command.as_ref().ok_or(BenchError::MissingWorkerCommand)?)
            }
        };
        // Unknown names are fatal before anything is submitted.
        self.provider.catalog()?.validate(queries)?;

        tracing::debug!(%mode, pool_size, num_queries = queries.len(), "starting batch");
        let started = Instant::now();
        let results = match worker_command {
            None => self.run_threads(queries, pool_size, per_task_timeout),
            Some(command) => process::run_processes(command, queries, pool_size, per_task_timeout),
        };
        let execution_time = started.elapsed().as_secs_f64();

        let result = ExecutionResult::from_outcomes(mode, pool_size, execution_time, results);
        tracing::info!(
            %mode,
            num_workers = pool_size,
            num_queries = result.num_queries,
            success_count = result.success_count,
            execution_time_secs = result.execution_time,
            "batch complete"
        );
        Ok(result)
    }

    fn run_threads(
        &self,
        queries: &[QueryName],
        pool_size: usize,
        timeout: Option<Duration>,
    ) -> Vec<TaskOutcome> {
        let provider = self.provider.as_ref();
        run_pool("pricewatch-thread", queries, pool_size, |worker_id, tasks, done| {
            thread_worker(worker_id, provider, tasks, done, timeout)
        })
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("worker_command", &self.worker_command)
            .finish_non_exhaustive()
    }
}

/// Run `body` on `pool_size` named scoped threads sharing one task queue.
///
/// Outcomes are returned in the order workers report them. Tasks left in
/// the queue after every worker exits (no worker could be started) are
/// recorded as `Worker` failures so the batch size is preserved.
pub(crate) fn run_pool<F>(
    label: &str,
    queries: &[QueryName],
    pool_size: usize,
    body: F,
) -> Vec<TaskOutcome>
where
    F: Fn(usize, Receiver<Task>, Sender<TaskOutcome>) + Sync,
{
    let (task_tx, task_rx) = crossbeam_channel::unbounded::<Task>();
    for (id, query) in queries.iter().enumerate() {
        let _ = task_tx.send(Task {
            id: id as u64,
            query: *query,
        });
    }
    drop(task_tx);

    let (done_tx, done_rx) = crossbeam_channel::unbounded::<TaskOutcome>();
    let mut results = Vec::with_capacity(queries.len());
    let body = &body;
    thread::scope(|scope| {
        for worker_id in 0..pool_size {
            let tasks = task_rx.clone();
            let done = done_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{label}-{worker_id}"))
                .spawn_scoped(scope, move || body(worker_id, tasks, done));
            if let Err(err) = spawned {
                tracing::warn!(worker_id, error = %err, "failed to start pool thread");
            }
        }
        drop(done_tx);
        results.extend(done_rx.iter());
    });

    for task in task_rx.try_iter() {
        results.push(Err(TaskFailure::worker(format!(
            "no worker available for '{}'",
            task.query
        ))));
    }
    results
}

fn thread_worker(
    worker_id: usize,
    provider: &dyn CatalogProvider,
    tasks: Receiver<Task>,
    done: Sender<TaskOutcome>,
    timeout: Option<Duration>,
) {
    let catalog = provider.catalog();
    for task in tasks.iter() {
        let outcome = match &catalog {
            Ok(catalog) => execute_task(catalog, task.query, timeout),
            Err(err) => Err(TaskFailure::worker(format!("catalog setup failed: {err}"))),
        };
        if let Err(failure) = &outcome {
            tracing::warn!(
                worker_id,
                task_id = task.id,
                query = %task.query,
                %failure,
                "task failed"
            );
        }
        if done.send(outcome).is_err() {
            break;
        }
    }
}

/// Invoke `name` once under `timeout`.
///
/// Panics become `Panic` failures. An operation that returns successfully
/// after its deadline is still a `Timeout`.
pub(crate) fn execute_task(
    catalog: &QueryCatalog,
    name: QueryName,
    timeout: Option<Duration>,
) -> TaskOutcome {
    let started = Instant::now();
    let ctx = QueryContext::with_timeout(timeout);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| catalog.invoke(name, &ctx)))
        .unwrap_or_else(|payload| {
            Err(TaskFailure::new(
                FailureKind::Panic,
                format!("query '{name}' panicked: {}", panic_message(payload.as_ref())),
            ))
        });
    match (outcome, timeout) {
        (Ok(_), Some(limit)) if started.elapsed() > limit => Err(TaskFailure::timeout(limit)),
        (outcome, _) => outcome,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QueryCatalog;
    use pricewatch_store::{Record, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn row(label: &str) -> Vec<Record> {
        let mut record = Record::new();
        record.push("label", Value::Text(label.to_string()));
        vec![record]
    }

    fn fixed_catalog() -> QueryCatalog {
        QueryName::ALL.into_iter().fold(QueryCatalog::new(), |catalog, name| {
            catalog.register(name, move |_| Ok(row(name.as_str())))
        })
    }

    fn executor_with(catalog: impl Fn() -> QueryCatalog + Send + Sync + 'static) -> Executor {
        Executor::new(Arc::new(move || -> Result<QueryCatalog> { Ok(catalog()) }))
    }

    #[test]
    fn zero_pool_size_is_fatal() {
        let executor = executor_with(fixed_catalog);
        let err = executor
            .run_concurrent(&QueryName::round_robin(3), ConcurrencyMode::Threads, 0, None)
            .unwrap_err();
        assert!(matches!(err, BenchError::InvalidPoolSize(0)));
    }

    #[test]
    fn process_mode_needs_a_worker_command() {
        let executor = executor_with(fixed_catalog);
        let err = executor
            .run_concurrent(&QueryName::round_robin(3), ConcurrencyMode::Processes, 2, None)
            .unwrap_err();
        assert!(matches!(err, BenchError::MissingWorkerCommand));
    }

    #[test]
    fn unknown_catalog_entry_is_fatal_before_submission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let executor = executor_with(move || {
            let seen = Arc::clone(&seen);
            QueryCatalog::new().register(QueryName::AvgPricesByProductType, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            })
        });
        let err = executor
            .run_concurrent(&QueryName::round_robin(6), ConcurrencyMode::Threads, 2, None)
            .unwrap_err();
        assert!(matches!(err, BenchError::UnknownQuery(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn healthy_batch_succeeds_for_every_task() {
        let executor = executor_with(fixed_catalog);
        let result = executor
            .run_concurrent(&QueryName::round_robin(12), ConcurrencyMode::Threads, 3, None)
            .unwrap();
        assert_eq!(result.mode, ConcurrencyMode::Threads);
        assert_eq!(result.num_workers, 3);
        assert_eq!(result.num_queries, 12);
        assert_eq!(result.success_count, 12);
        assert!(!result.is_degraded());
        assert!(result.execution_time >= 0.0);
    }

    #[test]
    fn huge_timeout_runs_without_a_deadline() {
        let executor = executor_with(fixed_catalog);
        let result = executor
            .run_concurrent(
                &QueryName::round_robin(6),
                ConcurrencyMode::Threads,
                2,
                Some(Duration::from_secs(u64::MAX / 2)),
            )
            .unwrap();
        assert_eq!(result.num_queries, 6);
        assert_eq!(result.success_count, 6);
    }

    #[test]
    fn always_failing_entry_never_escapes() {
        let executor = executor_with(|| {
            QueryName::ALL.into_iter().fold(QueryCatalog::new(), |catalog, name| {
                catalog.register(name, |_| Err(TaskFailure::query("relation does not exist")))
            })
        });
        for pool_size in 1..=4 {
            let result = executor
                .run_concurrent(
                    &QueryName::round_robin(9),
                    ConcurrencyMode::Threads,
                    pool_size,
                    None,
                )
                .unwrap();
            assert_eq!(result.num_queries, 9);
            assert_eq!(result.success_count, 0);
            assert_eq!(result.failures_by_kind().get(&FailureKind::Query), Some(&9));
        }
    }

    #[test]
    fn panics_and_late_returns_are_classified() {
        let executor = executor_with(|| {
            fixed_catalog()
                .register(QueryName::TopExpensiveProducts, |_| panic!("boom"))
                .register(QueryName::PromoAnalysisByStore, |_| {
                    thread::sleep(Duration::from_millis(60));
                    Ok(vec![])
                })
        });
        let result = executor
            .run_concurrent(
                &QueryName::round_robin(6),
                ConcurrencyMode::Threads,
                2,
                Some(Duration::from_millis(20)),
            )
            .unwrap();
        assert_eq!(result.num_queries, 6);
        assert_eq!(result.success_count, 4);
        let kinds = result.failures_by_kind();
        assert_eq!(kinds.get(&FailureKind::Panic), Some(&1));
        assert_eq!(kinds.get(&FailureKind::Timeout), Some(&1));
    }

    #[test]
    fn each_worker_thread_builds_its_own_catalog() {
        let builders = Arc::new(Mutex::new(HashSet::new()));
        let seen = Arc::clone(&builders);
        let executor = executor_with(move || {
            let name = thread::current().name().map(str::to_string).unwrap_or_default();
            seen.lock().unwrap().insert(name);
            fixed_catalog()
        });
        executor
            .run_concurrent(&QueryName::round_robin(8), ConcurrencyMode::Threads, 4, None)
            .unwrap();
        let builders = builders.lock().unwrap();
        // One probe catalog on the calling thread plus one per pool thread.
        for worker_id in 0..4 {
            assert!(builders.contains(&format!("pricewatch-thread-{worker_id}")));
        }
    }

    #[test]
    fn results_arrive_in_completion_order() {
        let executor = executor_with(|| {
            fixed_catalog().register(QueryName::AvgPricesByProductType, |_| {
                thread::sleep(Duration::from_millis(80));
                Ok(row("slow"))
            })
        });
        let result = executor
            .run_concurrent(&QueryName::round_robin(3), ConcurrencyMode::Threads, 3, None)
            .unwrap();
        let last = result.results.last().unwrap().as_ref().unwrap();
        assert_eq!(last[0].get("label"), Some(&Value::Text("slow".into())));
    }

    #[test]
    fn empty_workload_is_an_empty_result() {
        let executor = executor_with(fixed_catalog);
        let result = executor
            .run_concurrent(&[], ConcurrencyMode::Threads, 2, None)
            .unwrap();
        assert_eq!(result.num_queries, 0);
        assert_eq!(result.success_count, 0);
        assert!(!result.is_degraded());
    }
}
