//! Worker telemetry operations
//!
//! Mirrors the write discipline the dispatcher relies on: status upserts
//! preserve pending counts and performance history, an offline status
//! clears the advisory processing flag, and every write refreshes the
//! record TTL.

use super::models::{WorkerRecord, WorkerStatus};
use super::{worker_key, StateStore, WORKER_TTL_SECS};
use chrono::Utc;
use serde_json::Value;

impl StateStore {
    /// Register a worker URL, starting it in the online state
    pub async fn add_worker(&self, url: &str) {
        self.upsert_worker_status(url, WorkerStatus::Online, None, false)
            .await;
    }

    /// Forget a worker entirely
    pub async fn remove_worker(&self, url: &str) {
        self.remove_key(&worker_key(url)).await;
    }

    /// Read one worker record
    pub async fn get_worker(&self, url: &str) -> Option<WorkerRecord> {
        self.fetch_json(&worker_key(url)).await
    }

    /// All known worker records
    pub async fn list_workers(&self) -> Vec<WorkerRecord> {
        let mut workers = Vec::new();
        for key in self.matching_keys("worker:*").await {
            if let Some(record) = self.fetch_json::<WorkerRecord>(&key).await {
                workers.push(record);
            }
        }
        workers
    }

    /// All known worker URLs
    pub async fn worker_urls(&self) -> Vec<String> {
        self.list_workers().await.into_iter().map(|w| w.url).collect()
    }

    /// Write a worker's status, preserving pending count and history.
    ///
    /// An offline worker cannot be mid-reservation, so offline writes force
    /// the processing flag down.
    pub async fn upsert_worker_status(
        &self,
        url: &str,
        status: WorkerStatus,
        metadata: Option<Value>,
        is_processing: bool,
    ) {
        let existing = self.get_worker(url).await;
        let (pending_chunks, performance_history) = match existing {
            Some(record) => (record.pending_chunks, record.performance_history),
            None => (0, Vec::new()),
        };

        let record = WorkerRecord {
            url: url.to_string(),
            status,
            is_processing: is_processing && status != WorkerStatus::Offline,
            last_updated: Utc::now(),
            metadata: metadata.unwrap_or_else(|| Value::Object(Default::default())),
            pending_chunks,
            performance_history,
        };
        self.put_json(&worker_key(url), &record, WORKER_TTL_SECS)
            .await;
    }

    /// Mark a worker unreachable
    pub async fn mark_worker_offline(&self, url: &str) {
        self.upsert_worker_status(url, WorkerStatus::Offline, None, false)
            .await;
    }

    /// Mark a worker as running a chunk for the given job
    pub async fn mark_worker_busy(&self, url: &str, job_id: &str) {
        let metadata = serde_json::json!({ "job_id": job_id });
        self.upsert_worker_status(url, WorkerStatus::Busy, Some(metadata), true)
            .await;
    }

    /// Return a worker to the online pool
    pub async fn mark_worker_idle(&self, url: &str) {
        self.upsert_worker_status(url, WorkerStatus::Online, None, false)
            .await;
    }

    /// Flip the advisory processing flag without touching status
    pub async fn set_worker_processing(&self, url: &str, is_processing: bool) {
        if let Some(mut record) = self.get_worker(url).await {
            record.is_processing = is_processing;
            record.last_updated = Utc::now();
            self.put_json(&worker_key(url), &record, WORKER_TTL_SECS)
                .await;
        }
    }

    /// Count one more in-flight chunk for a worker
    pub async fn increment_worker_pending(&self, url: &str) {
        if let Some(mut record) = self.get_worker(url).await {
            record.pending_chunks += 1;
            record.last_updated = Utc::now();
            self.put_json(&worker_key(url), &record, WORKER_TTL_SECS)
                .await;
        }
    }

    /// Count one fewer in-flight chunk, never going below zero
    pub async fn decrement_worker_pending(&self, url: &str) {
        if let Some(mut record) = self.get_worker(url).await {
            record.pending_chunks = record.pending_chunks.saturating_sub(1);
            record.last_updated = Utc::now();
            self.put_json(&worker_key(url), &record, WORKER_TTL_SECS)
                .await;
        }
    }

    /// Append a performance sample for a finished chunk
    pub async fn record_worker_performance(
        &self,
        url: &str,
        chunk_duration_sec: f64,
        processing_time_sec: f64,
    ) {
        if let Some(mut record) = self.get_worker(url).await {
            record.record_sample(chunk_duration_sec, processing_time_sec);
            record.last_updated = Utc::now();
            self.put_json(&worker_key(url), &record, WORKER_TTL_SECS)
                .await;
        }
    }

    /// Mean speed ratio over a worker's recent samples, 1.0 without history
    pub async fn worker_avg_speed_ratio(&self, url: &str) -> f64 {
        match self.get_worker(url).await {
            Some(record) => record.avg_speed_ratio(),
            None => 1.0,
        }
    }
}
