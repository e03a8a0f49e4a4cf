//! Staged job pipeline
//!
//! Each submission runs in its own background task through the stages
//! purify, split, dispatch, and aggregate. Chunk dispatch fans out with a
//! parallelism equal to the worker pool size, longest chunks first, and the
//! results are reassembled in original chunk order whatever order they
//! finish in. Every stage transition and chunk completion publishes the
//! full job record to the job's notification room.

use crate::audio::{self, wav};
use crate::config::{PipelineConfig, SplitterConfig};
use crate::dispatch::{Dispatcher, TranscriptResult};
use crate::error::{AppError, Result};
use crate::events::JobEventBus;
use crate::jobs::aggregator;
use crate::store::{JobStatus, StateStore, DEFAULT_USER};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Coordinates the staged pipeline for every submitted recording
pub struct JobOrchestrator {
    store: StateStore,
    dispatcher: Arc<Dispatcher>,
    events: JobEventBus,
    splitter: SplitterConfig,
    pipeline: PipelineConfig,
}

impl JobOrchestrator {
    pub fn new(
        store: StateStore,
        dispatcher: Arc<Dispatcher>,
        events: JobEventBus,
        splitter: SplitterConfig,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            events,
            splitter,
            pipeline,
        }
    }

    /// Accept a staged upload and start its pipeline in the background.
    ///
    /// Returns the job id immediately; progress is observable through the
    /// job resource and the notification room.
    pub async fn submit(self: Arc<Self>, filename: &str, source_path: PathBuf) -> String {
        let job_id = Uuid::new_v4().to_string();

        let use_purifier = self
            .store
            .get_preference(DEFAULT_USER, "use_purifier")
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        self.store.create_job(&job_id, filename).await;
        self.emit_job(&job_id).await;

        let orchestrator = Arc::clone(&self);
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            orchestrator.run(task_job_id, source_path, use_purifier).await;
        });

        job_id
    }

    async fn run(self: Arc<Self>, job_id: String, source_path: PathBuf, use_purifier: bool) {
        if let Err(e) = self.execute(&job_id, &source_path, use_purifier).await {
            error!("Job {} failed: {}", job_id, e);
            self.store.update_job_status(&job_id, JobStatus::Failed).await;
            self.emit_job(&job_id).await;
        }
        self.events.retire(&job_id).await;
    }

    async fn execute(&self, job_id: &str, source_path: &Path, use_purifier: bool) -> Result<()> {
        if use_purifier {
            self.advance(job_id, JobStatus::Purifying).await;
            info!("Purifier: starting noise reduction for {}", job_id);
            sleep(Duration::from_millis(self.pipeline.purifier_delay_ms)).await;
            self.advance(job_id, JobStatus::PurifierCompleted).await;
            sleep(Duration::from_millis(self.pipeline.stage_settle_ms)).await;
        } else {
            info!("Purifier: bypassed by user preference for {}", job_id);
            self.advance(job_id, JobStatus::PurifierBypassed).await;
            sleep(Duration::from_millis(self.pipeline.stage_settle_ms)).await;
        }

        self.advance(job_id, JobStatus::Splitting).await;
        let source = source_path.to_path_buf();
        let chunks_dir = self.pipeline.chunks_dir.clone();
        let splitter_config = self.splitter.clone();
        let chunk_paths = tokio::task::spawn_blocking(move || {
            audio::split_audio(&source, &chunks_dir, &splitter_config)
        })
        .await
        .map_err(|e| AppError::job(format!("Splitter task failed: {}", e)))??;

        let total = chunk_paths.len();
        info!("Job {}: {} chunks", job_id, total);
        self.store.set_total_chunks(job_id, total as u32).await;
        self.advance(job_id, JobStatus::Processing).await;

        let mut durations_ms = vec![0u64; total];
        for (i, path) in chunk_paths.iter().enumerate() {
            durations_ms[i] = match wav::duration_ms(path) {
                Ok(duration) => duration,
                Err(e) => {
                    warn!("Could not read duration of {}: {}", path.display(), e);
                    0
                }
            };
        }

        // Start the most expensive chunks first so no long tail of work is
        // left for the end of the job.
        let mut order: Vec<usize> = (0..total).collect();
        order.sort_by(|&a, &b| durations_ms[b].cmp(&durations_ms[a]));

        let parallelism = self.dispatcher.worker_count().await.max(1);
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut tasks = JoinSet::new();
        for i in order {
            let semaphore = Arc::clone(&semaphore);
            let dispatcher = Arc::clone(&self.dispatcher);
            let path = chunk_paths[i].clone();
            let job_id = job_id.to_string();
            let duration_sec = durations_ms[i] as f64 / 1_000.0;
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (i, None),
                };
                let chunk_id = format!("{}_chunk_{}", job_id, i);
                let result = dispatcher
                    .process_chunk(&path, &job_id, &chunk_id, duration_sec)
                    .await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to delete chunk {}: {}", path.display(), e);
                }
                (i, result)
            });
        }

        let mut results: Vec<Option<TranscriptResult>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, result)) => {
                    results[i] = result;
                    self.emit_job(job_id).await;
                }
                Err(e) => warn!("Chunk dispatch task failed: {}", e),
            }
        }

        self.advance(job_id, JobStatus::Aggregating).await;
        let transcript = aggregator::aggregate_results(&results, &durations_ms);

        if let Err(e) = tokio::fs::remove_file(source_path).await {
            warn!("Failed to delete {}: {}", source_path.display(), e);
        }

        self.store.set_job_result(job_id, transcript).await;
        self.advance(job_id, JobStatus::Completed).await;
        info!("Job {} completed", job_id);
        Ok(())
    }

    async fn advance(&self, job_id: &str, status: JobStatus) {
        self.store.update_job_status(job_id, status).await;
        self.emit_job(job_id).await;
    }

    async fn emit_job(&self, job_id: &str) {
        if let Some(job) = self.store.get_job(job_id).await {
            self.events.publish(&job).await;
        }
    }
}
