//! Worker side of process mode.
//!
//! A worker reads [`TaskRequest`] frames until EOF. For every request it builds
//! a fresh catalog (and therefore opens a fresh connection), runs the query
//! under the request's timeout and writes one [`TaskResponse`].

use crate::catalog::CatalogProvider;
use crate::error::{Result, TaskFailure};
use crate::executor::execute_task;
use crate::protocol::{self, TaskRequest, TaskResponse};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

pub struct Worker<'a> {
    provider: &'a dyn CatalogProvider,
    fake_delay: Duration,
}

impl<'a> Worker<'a> {
    pub fn new(provider: &'a dyn CatalogProvider) -> Self {
        Self {
            provider,
            fake_delay: Duration::ZERO,
        }
    }

    /// Sleep before each task. Used to exercise driver-side timeouts.
    pub fn with_fake_delay(mut self, delay: Duration) -> Self {
        self.fake_delay = delay;
        self
    }

    /// Serve requests from `reader` until EOF; returns the number answered.
    pub fn serve<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<usize> {
        let mut served = 0;
        while let Some(request) = protocol::recv::<_, TaskRequest>(&mut reader)? {
            let response = self.handle(request);
            protocol::send(&mut writer, &response)?;
            served += 1;
        }
        tracing::debug!(served, "worker input closed");
        Ok(served)
    }

    fn handle(&self, request: TaskRequest) -> TaskResponse {
        if !self.fake_delay.is_zero() {
            thread::sleep(self.fake_delay);
        }
        let outcome = match self.provider.catalog() {
            Ok(catalog) => execute_task(&catalog, request.query, request.timeout()),
            Err(err) => Err(TaskFailure::worker(format!("catalog setup failed: {err}"))),
        };
        match &outcome {
            Ok(records) => {
                tracing::debug!(
                    task_id = request.task_id,
                    query = %request.query,
                    rows = records.len(),
                    "task done"
                )
            }
            Err(failure) => {
                tracing::warn!(
                    task_id = request.task_id,
                    query = %request.query,
                    %failure,
                    "task failed"
                )
            }
        }
        TaskResponse {
            task_id: request.task_id,
            outcome,
        }
    }
}
