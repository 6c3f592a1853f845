//! Batch worker — claims pending tasks, dispatches them to the model, and
//! records per-symbol outcomes.
//!
//! Workers drain naturally: an empty claim means no pending work remains
//! and the loop returns. A transport failure (timeout, HTTP error, empty or
//! malformed reply, cancellation mid-call) marks the whole claimed batch
//! failed; a model-reported per-symbol failure marks only that task, without
//! bumping its retry count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::llm::{build_prompt, LlmClient};
use crate::store::{Task, TaskStore};

/// Backoff before retrying a failed claim.
const CLAIM_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Shared dependencies for the worker pool.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn TaskStore>,
    pub llm: Arc<dyn LlmClient>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub shutdown: CancellationToken,
}

/// One consumer in the worker pool.
pub struct Worker {
    worker_id: usize,
    deps: WorkerDeps,
}

impl Worker {
    pub fn new(worker_id: usize, deps: WorkerDeps) -> Self {
        Self { worker_id, deps }
    }

    /// Run until the queue drains or shutdown is signalled.
    pub async fn run(self) {
        info!(worker = self.worker_id, "Worker started");

        loop {
            if self.deps.shutdown.is_cancelled() {
                info!(worker = self.worker_id, "Worker observed shutdown");
                break;
            }

            let tasks = match self.deps.store.claim(self.deps.batch_size).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(worker = self.worker_id, error = %e, "Claim failed, backing off");
                    tokio::select! {
                        _ = self.deps.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(CLAIM_RETRY_DELAY) => {}
                    }
                    continue;
                }
            };

            if tasks.is_empty() {
                info!(worker = self.worker_id, "No more tasks to process");
                break;
            }

            debug!(worker = self.worker_id, batch = tasks.len(), "Processing batch");
            self.process_batch(&tasks).await;
        }

        info!(worker = self.worker_id, "Worker finished");
    }

    async fn process_batch(&self, tasks: &[Task]) {
        let prompt = match build_prompt(tasks) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(worker = self.worker_id, error = %e, "Failed to format prompt");
                for task in tasks {
                    self.record_failure(task.id, "Failed to format prompt", task.retries + 1)
                        .await;
                }
                return;
            }
        };

        // Cancellation drops the in-flight HTTP exchange.
        let outcomes = tokio::select! {
            _ = self.deps.shutdown.cancelled() => Err(ModelError::Cancelled),
            result = self.deps.llm.infer(&prompt) => result,
        };

        let outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(worker = self.worker_id, error = %e, "Model call failed, marking batch as failed");
                let message = e.to_string();
                for task in tasks {
                    if task.retries < self.deps.max_retries {
                        self.record_failure(task.id, &message, task.retries + 1).await;
                    } else {
                        self.record_failure(task.id, "Max retries exceeded", task.retries)
                            .await;
                    }
                }
                return;
            }
        };

        let by_symbol: HashMap<&str, &Task> = tasks
            .iter()
            .map(|task| (task.symbol_name.as_str(), task))
            .collect();

        for outcome in &outcomes {
            let Some(task) = by_symbol.get(outcome.symbol_name.as_str()) else {
                warn!(
                    worker = self.worker_id,
                    symbol = %outcome.symbol_name,
                    "Received result for unknown symbol"
                );
                continue;
            };

            if outcome.success {
                if let Err(e) = self
                    .deps
                    .store
                    .complete(task.id, &outcome.decompiled_source)
                    .await
                {
                    warn!(worker = self.worker_id, task = task.id, error = %e, "Failed to record success");
                }
            } else {
                debug!(
                    worker = self.worker_id,
                    symbol = %task.symbol_name,
                    error = %outcome.error_message,
                    "Model could not decompile symbol"
                );
                // The model processed the request; not a transport retry.
                self.record_failure(task.id, &outcome.error_message, task.retries)
                    .await;
            }
        }
        // Tasks the model returned no outcome for stay in_flight and are
        // recovered by the next startup reset.
    }

    async fn record_failure(&self, id: i64, message: &str, retries: u32) {
        if let Err(e) = self.deps.store.fail(id, message, retries).await {
            warn!(worker = self.worker_id, task = id, error = %e, "Failed to record failure");
        }
    }
}
