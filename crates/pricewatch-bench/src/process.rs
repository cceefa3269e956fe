//! Process-mode pool.
//!
//! Each pool slot is a driver thread owning one worker child started from a
//! [`WorkerCommand`]. The driver sends one [`TaskRequest`] frame at a time and
//! waits for the response. A child that overruns its timeout is killed and
//! replaced before the next task. A child that cannot be started or dies
//! fails only the tasks routed to its slot.

use crate::error::{BenchError, TaskFailure};
use crate::executor::{run_pool, Task};
use crate::protocol::{self, TaskRequest, TaskResponse};
use crate::query::QueryName;
use crate::result::TaskOutcome;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Extra time a worker gets past the task timeout to report its own
/// `Timeout` before the driver kills it.
const KILL_GRACE: Duration = Duration::from_millis(500);
/// How long a worker may take to exit after its stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

/// Program and arguments that start one process-mode worker speaking the
/// frame protocol on stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `<program> worker --db <database> --top-products-limit <limit>`.
    pub fn pricewatch_worker(
        program: impl Into<PathBuf>,
        database: &Path,
        top_products_limit: usize,
    ) -> Self {
        Self::new(program)
            .arg("worker")
            .arg("--db")
            .arg(database.to_string_lossy())
            .arg("--top-products-limit")
            .arg(top_products_limit.to_string())
    }

    fn spawn(&self, slot: usize) -> io::Result<WorkerProcess> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take();
        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "worker stdout unavailable"));
        };

        let (tx, responses) = crossbeam_channel::unbounded();
        let reader = thread::Builder::new()
            .name(format!("pricewatch-reader-{slot}"))
            .spawn(move || loop {
                match protocol::recv::<_, TaskResponse>(&mut stdout) {
                    Ok(Some(response)) => {
                        if tx.send(Ok(response)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            });
        let reader = match reader {
            Ok(handle) => handle,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };

        tracing::debug!(
            slot,
            pid = child.id(),
            program = %self.program.display(),
            "worker started"
        );
        Ok(WorkerProcess {
            child,
            stdin,
            responses,
            reader: Some(reader),
        })
    }
}

/// A live worker child. Dropping it closes stdin, waits briefly for a clean
/// exit, then kills and reaps the child.
struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    responses: Receiver<Result<TaskResponse, BenchError>>,
    reader: Option<JoinHandle<()>>,
}

/// Result of one request/response exchange.
enum Exchange {
    /// The worker answered; it can take the next task.
    Answered(TaskOutcome),
    /// The worker must be discarded.
    Broken(TaskFailure),
}

impl WorkerProcess {
    fn exchange(&mut self, request: &TaskRequest, timeout: Option<Duration>) -> Exchange {
        let started = Instant::now();
        let Some(stdin) = self.stdin.as_mut() else {
            return Exchange::Broken(TaskFailure::worker("worker stdin already closed"));
        };
        if let Err(err) = protocol::send(stdin, request) {
            return Exchange::Broken(TaskFailure::worker(format!("failed to send task: {err}")));
        }

        let received = match timeout {
            Some(limit) => self.responses.recv_timeout(limit.saturating_add(KILL_GRACE)),
            None => self.responses.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(Ok(response)) if response.task_id == request.task_id => {
                match (response.outcome, timeout) {
                    (Ok(_), Some(limit)) if started.elapsed() > limit => {
                        Exchange::Answered(Err(TaskFailure::timeout(limit)))
                    }
                    (outcome, _) => Exchange::Answered(outcome),
                }
            }
            Ok(Ok(response)) => Exchange::Broken(TaskFailure::worker(format!(
                "worker answered task {} while task {} was pending",
                response.task_id, request.task_id
            ))),
            Ok(Err(err)) => Exchange::Broken(TaskFailure::worker(err.to_string())),
            Err(RecvTimeoutError::Timeout) => {
                self.terminate();
                // A timeout is only reachable when a limit was set.
                Exchange::Broken(TaskFailure::timeout(timeout.unwrap_or_default()))
            }
            Err(RecvTimeoutError::Disconnected) => Exchange::Broken(self.exit_failure()),
        }
    }

    fn exit_failure(&mut self) -> TaskFailure {
        TaskFailure::worker(match self.child.try_wait() {
            Ok(Some(status)) => format!("worker exited before answering ({status})"),
            Ok(None) => "worker closed its output before answering".to_string(),
            Err(err) => format!("worker exited before answering: {err}"),
        })
    }

    fn terminate(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => thread::sleep(SHUTDOWN_POLL),
                _ => {
                    self.terminate();
                    break;
                }
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

pub(crate) fn run_processes(
    command: &WorkerCommand,
    queries: &[QueryName],
    pool_size: usize,
    timeout: Option<Duration>,
) -> Vec<TaskOutcome> {
    run_pool("pricewatch-driver", queries, pool_size, |slot, tasks, done| {
        drive_worker(slot, command, tasks, done, timeout)
    })
}

fn drive_worker(
    slot: usize,
    command: &WorkerCommand,
    tasks: Receiver<Task>,
    done: Sender<TaskOutcome>,
    timeout: Option<Duration>,
) {
    let mut worker = start(command, slot).ok();
    for task in tasks.iter() {
        if worker.is_none() {
            worker = start(command, slot).ok();
        }
        let outcome = match worker.as_mut() {
            None => Err(TaskFailure::worker(format!(
                "could not start worker '{}'",
                command.program.display()
            ))),
            Some(process) => {
                let request = TaskRequest::new(task.id, task.query, timeout);
                match process.exchange(&request, timeout) {
                    Exchange::Answered(outcome) => outcome,
                    Exchange::Broken(failure) => {
                        worker = None;
                        Err(failure)
                    }
                }
            }
        };
        if let Err(failure) = &outcome {
            tracing::warn!(slot, task_id = task.id, query = %task.query, %failure, "task failed");
        }
        if done.send(outcome).is_err() {
            break;
        }
    }
}

fn start(command: &WorkerCommand, slot: usize) -> io::Result<WorkerProcess> {
    command.spawn(slot).map_err(|err| {
        tracing::warn!(
            slot,
            program = %command.program.display(),
            error = %err,
            "failed to start worker"
        );
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricewatch_worker_command_line() {
        let command = WorkerCommand::pricewatch_worker(
            "/usr/bin/pricewatch",
            Path::new("/tmp/db.sqlite3"),
            25,
        );
        assert_eq!(command.program, PathBuf::from("/usr/bin/pricewatch"));
        assert_eq!(
            command.args,
            vec!["worker", "--db", "/tmp/db.sqlite3", "--top-products-limit", "25"]
        );
    }

    #[test]
    fn missing_program_fails_every_task_as_worker() {
        let command = WorkerCommand::new("/nonexistent/pricewatch-worker");
        let results = run_processes(&command, &QueryName::round_robin(5), 2, None);
        assert_eq!(results.len(), 5);
        for outcome in results {
            assert_eq!(outcome.unwrap_err().kind, crate::FailureKind::Worker);
        }
    }

    #[cfg(unix)]
    #[test]
    fn worker_that_exits_immediately_is_reported() {
        // `true` ignores stdin and exits; each task sees a closed pipe or EOF.
        let command = WorkerCommand::new("true");
        let results = run_processes(
            &command,
            &QueryName::round_robin(3),
            1,
            Some(Duration::from_secs(5)),
        );
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(f) if f.kind == crate::FailureKind::Worker)));
    }

    #[cfg(unix)]
    #[test]
    fn huge_timeout_does_not_overflow_the_driver() {
        // `cat` echoes the request frame, which is not a valid response.
        let command = WorkerCommand::new("cat");
        let results = run_processes(&command, &QueryName::round_robin(2), 1, Some(Duration::MAX));
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(f) if f.kind == crate::FailureKind::Worker)));
    }

    #[cfg(unix)]
    #[test]
    fn silent_worker_is_killed_on_timeout() {
        // `sleep` never answers and must be killed for each task.
        let command = WorkerCommand::new("sleep").arg("30");
        let started = Instant::now();
        let results = run_processes(
            &command,
            &QueryName::round_robin(2),
            1,
            Some(Duration::from_millis(50)),
        );
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(f) if f.kind == crate::FailureKind::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
