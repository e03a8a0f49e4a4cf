//! Chunk dispatch to remote transcription workers
//!
//! Selection and reservation run under a single scheduling mutex so only
//! one dispatch decision is in flight at a time; the actual network call
//! happens outside the lock. The worker set is shared with the management
//! API, which mutates it in place when workers are added or removed.

use crate::dispatch::scheduler;
use crate::dispatch::types::{OnlineWorker, TranscriptResult, WorkerSnapshot};
use crate::store::{ResultSummary, StateStore, WorkerStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Dispatcher for assigning chunks to workers and executing the transfers
pub struct Dispatcher {
    store: StateStore,
    client: reqwest::Client,
    workers: Arc<RwLock<Vec<String>>>,
    schedule_lock: Mutex<()>,
    probe_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over the given worker URLs
    pub fn new(store: StateStore, workers: Vec<String>, probe_timeout: Duration) -> Self {
        // No default timeout: chunk transcription can take minutes to hours.
        // Health probes set their own short per-request timeout.
        Self {
            store,
            client: reqwest::Client::new(),
            workers: Arc::new(RwLock::new(workers)),
            schedule_lock: Mutex::new(()),
            probe_timeout,
        }
    }

    /// Current worker URLs
    pub async fn worker_urls(&self) -> Vec<String> {
        self.workers.read().await.clone()
    }

    /// Number of configured workers
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Replace the worker set in place.
    ///
    /// Runs under the scheduling mutex so no selection decision observes a
    /// half-updated set.
    pub async fn replace_workers(&self, urls: Vec<String>) {
        let _guard = self.schedule_lock.lock().await;
        *self.workers.write().await = urls;
    }

    /// Probe every known worker and report the ones that answered.
    ///
    /// HTTP 404 counts as alive: the worker root may simply not implement
    /// a route.
    pub async fn list_online_workers(&self) -> Vec<OnlineWorker> {
        let urls = self.worker_urls().await;
        let mut online = Vec::new();

        for (i, url) in urls.iter().enumerate() {
            let probe = self
                .client
                .get(format!("{}/", url))
                .timeout(self.probe_timeout)
                .send()
                .await;

            match probe {
                Ok(response)
                    if response.status() == reqwest::StatusCode::OK
                        || response.status() == reqwest::StatusCode::NOT_FOUND =>
                {
                    online.push(OnlineWorker {
                        id: i + 1,
                        url: url.clone(),
                        status: "online".to_string(),
                    });
                    self.store
                        .upsert_worker_status(url, WorkerStatus::Online, None, false)
                        .await;
                }
                Ok(response) => {
                    debug!("Worker {} answered with {}", url, response.status());
                    self.store.mark_worker_offline(url).await;
                }
                Err(e) => {
                    debug!("Worker {} probe failed: {}", url, e);
                    self.store.mark_worker_offline(url).await;
                }
            }
        }

        online
    }

    /// Assign one chunk to the best available worker and transcribe it.
    ///
    /// Returns None when no worker is available or the transfer fails; the
    /// caller treats a missing result as a dropped chunk.
    pub async fn process_chunk(
        &self,
        chunk_path: &Path,
        job_id: &str,
        chunk_id: &str,
        chunk_duration_sec: f64,
    ) -> Option<TranscriptResult> {
        // Selection plus reservation is atomic with respect to other
        // dispatch calls.
        let worker_url = {
            let _guard = self.schedule_lock.lock().await;

            let snapshots = self.snapshots().await;
            let Some(url) = scheduler::select_worker(&snapshots, chunk_duration_sec) else {
                warn!("No available worker for {}", chunk_id);
                return None;
            };

            self.store.set_worker_processing(&url, true).await;
            self.store.mark_worker_busy(&url, job_id).await;
            self.store.increment_worker_pending(&url).await;
            url
        };

        info!(
            "Sending {} ({:.1}s) to {}",
            chunk_id, chunk_duration_sec, worker_url
        );
        self.store
            .add_chunk_to_job(job_id, chunk_id, &worker_url)
            .await;

        let body = match tokio::fs::read(chunk_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read chunk {}: {}", chunk_path.display(), e);
                self.release_worker(&worker_url).await;
                return None;
            }
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/transcribe", worker_url))
            .query(&[("include_formatted_log", "false")])
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(body)
            .send()
            .await;
        let processing_time_sec = started.elapsed().as_secs_f64();

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<TranscriptResult>().await {
                    Ok(result) => {
                        self.store
                            .complete_chunk(
                                job_id,
                                chunk_id,
                                Some(ResultSummary {
                                    text_length: result.text.len(),
                                    segments_count: result.segments.len(),
                                }),
                            )
                            .await;
                        self.release_worker(&worker_url).await;
                        self.store
                            .record_worker_performance(
                                &worker_url,
                                chunk_duration_sec,
                                processing_time_sec,
                            )
                            .await;

                        let speed = if chunk_duration_sec > 0.0 {
                            processing_time_sec / chunk_duration_sec
                        } else {
                            1.0
                        };
                        info!(
                            "{} completed {} in {:.1}s (speed: {:.2}x)",
                            worker_url, chunk_id, processing_time_sec, speed
                        );
                        Some(result)
                    }
                    Err(e) => {
                        warn!("Unparseable response from {}: {}", worker_url, e);
                        self.release_worker(&worker_url).await;
                        None
                    }
                }
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                warn!("Worker {} returned {}: {}", worker_url, status, snippet);
                self.release_worker(&worker_url).await;
                None
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", worker_url, e);
                self.store.set_worker_processing(&worker_url, false).await;
                self.store.mark_worker_offline(&worker_url).await;
                self.store.decrement_worker_pending(&worker_url).await;
                None
            }
        }
    }

    /// Undo a reservation after a transfer finishes or fails
    async fn release_worker(&self, url: &str) {
        self.store.set_worker_processing(url, false).await;
        self.store.mark_worker_idle(url).await;
        self.store.decrement_worker_pending(url).await;
    }

    async fn snapshots(&self) -> Vec<WorkerSnapshot> {
        let urls = self.worker_urls().await;
        let mut snapshots = Vec::with_capacity(urls.len());
        for url in urls {
            let snapshot = match self.store.get_worker(&url).await {
                Some(record) => WorkerSnapshot {
                    online: record.status == WorkerStatus::Online,
                    is_processing: record.is_processing,
                    pending: record.pending_chunks,
                    benchmarked: record.is_benchmarked(),
                    avg_speed: record.avg_speed_ratio(),
                    url,
                },
                None => WorkerSnapshot {
                    online: false,
                    is_processing: false,
                    pending: 0,
                    benchmarked: false,
                    avg_speed: 1.0,
                    url,
                },
            };
            snapshots.push(snapshot);
        }
        snapshots
    }
}
