//! Run supervision — store lifecycle, crash recovery, worker pool, and
//! final assembly.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::assemble;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::llm::LiteLlmClient;
use crate::progress;
use crate::scan;
use crate::store::{LibSqlStore, TaskStore};
use crate::worker::{Worker, WorkerDeps};

/// Owns one full decompilation pass: recover, drain, assemble.
pub struct Supervisor {
    config: EngineConfig,
}

impl Supervisor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run to completion. Returns once the queue has drained (or shutdown
    /// was requested) and the output files are assembled.
    pub async fn run(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let store: Arc<dyn TaskStore> =
            Arc::new(LibSqlStore::open(&self.config.db_path).await?);

        let initial = store.progress().await?;
        if initial.total == 0 {
            info!(input = %self.config.input_dir.display(), "First run, scanning for tasks");
            let tasks = scan::scan_input_dir(&self.config.input_dir)?;
            let inserted = store.seed(&tasks).await?;
            info!(count = inserted, "Seeded task store");
        } else {
            info!("Resuming previous session, resetting in-flight tasks");
            store.reset_in_flight().await?;
        }

        let shutdown = CancellationToken::new();
        // Translate the OS interrupt into the single shutdown signal every
        // worker and in-flight model call observes.
        let signal_handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received, stopping workers after current batches");
                    shutdown.cancel();
                }
            })
        };

        let llm = Arc::new(LiteLlmClient::new(
            self.config.litellm_url.clone(),
            self.config.model.clone(),
        )?);

        let deps = WorkerDeps {
            store: Arc::clone(&store),
            llm,
            batch_size: self.config.batch_size,
            max_retries: self.config.max_retries,
            shutdown: shutdown.clone(),
        };

        let workers: Vec<_> = (0..self.config.concurrency)
            .map(|worker_id| tokio::spawn(Worker::new(worker_id, deps.clone()).run()))
            .collect();
        info!(count = self.config.concurrency, "Worker pool started");

        let reporter_stop = CancellationToken::new();
        let reporter = tokio::spawn(progress::report_progress(
            Arc::clone(&store),
            reporter_stop.clone(),
        ));

        for result in join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }
        reporter_stop.cancel();
        let _ = reporter.await;
        signal_handle.abort();

        info!("All workers have finished, assembling output files");
        let written = assemble::assemble_files(store.as_ref(), &self.config.output_dir).await?;
        info!(
            count = written,
            output = %self.config.output_dir.display(),
            "Assembly complete"
        );

        Ok(())
    }
}
