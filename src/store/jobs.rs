//! Job lifecycle operations
//!
//! Job records are mutated by the orchestrator and by parallel dispatch
//! tasks; every read-modify-write cycle runs under the job's in-process
//! lock so concurrent chunk completions cannot lose updates.

use super::models::{
    ChunkRecord, ChunkStatus, JobRecord, JobStatus, ResultSummary,
};
use super::{job_key, StateStore, JOB_TTL_SECS};
use crate::jobs::aggregator::AggregatedTranscript;
use chrono::Utc;

impl StateStore {
    /// Create a job record in the `created` state
    pub async fn create_job(&self, job_id: &str, filename: &str) {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        let record = JobRecord::new(job_id, filename);
        self.put_json(&job_key(job_id), &record, JOB_TTL_SECS).await;
    }

    /// Read one job record
    pub async fn get_job(&self, job_id: &str) -> Option<JobRecord> {
        self.fetch_json(&job_key(job_id)).await
    }

    /// Set a job's lifecycle status
    pub async fn update_job_status(&self, job_id: &str, status: JobStatus) {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        if let Some(mut record) = self.get_job(job_id).await {
            record.status = status;
            record.updated_at = Utc::now();
            self.put_json(&job_key(job_id), &record, JOB_TTL_SECS).await;
        }
    }

    /// Record the chunk count produced by the splitter
    pub async fn set_total_chunks(&self, job_id: &str, total: u32) {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        if let Some(mut record) = self.get_job(job_id).await {
            record.total_chunks = total;
            record.updated_at = Utc::now();
            self.put_json(&job_key(job_id), &record, JOB_TTL_SECS).await;
        }
    }

    /// Append a chunk assignment to a job
    pub async fn add_chunk_to_job(&self, job_id: &str, chunk_id: &str, worker_url: &str) {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        if let Some(mut record) = self.get_job(job_id).await {
            record.chunks.push(ChunkRecord {
                chunk_id: chunk_id.to_string(),
                worker_url: worker_url.to_string(),
                status: ChunkStatus::Processing,
                started_at: Utc::now(),
                completed_at: None,
                result_summary: None,
            });
            record.updated_at = Utc::now();
            self.put_json(&job_key(job_id), &record, JOB_TTL_SECS).await;
        }
    }

    /// Mark a chunk completed and refresh the derived completion count.
    ///
    /// When the last chunk completes the job advances from `processing` to
    /// `aggregating`; a job already past `processing` is left untouched so
    /// the auto-advance can never regress a later status.
    pub async fn complete_chunk(
        &self,
        job_id: &str,
        chunk_id: &str,
        result_summary: Option<ResultSummary>,
    ) {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        if let Some(mut record) = self.get_job(job_id).await {
            if let Some(chunk) = record.chunks.iter_mut().find(|c| c.chunk_id == chunk_id) {
                chunk.status = ChunkStatus::Completed;
                chunk.completed_at = Some(Utc::now());
                chunk.result_summary = result_summary;
            }

            record.recount_completed();

            if record.total_chunks > 0
                && record.completed_chunks == record.total_chunks
                && record.status == JobStatus::Processing
            {
                record.status = JobStatus::Aggregating;
            }

            record.updated_at = Utc::now();
            self.put_json(&job_key(job_id), &record, JOB_TTL_SECS).await;
        }
    }

    /// Attach the aggregated transcript to a job
    pub async fn set_job_result(&self, job_id: &str, result: AggregatedTranscript) {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        if let Some(mut record) = self.get_job(job_id).await {
            record.result = Some(result);
            record.updated_at = Utc::now();
            self.put_json(&job_key(job_id), &record, JOB_TTL_SECS).await;
        }
    }

    /// Recent jobs, newest first
    pub async fn list_recent_jobs(&self, limit: usize) -> Vec<JobRecord> {
        let mut jobs = Vec::new();
        for key in self.matching_keys("job:*").await {
            if let Some(record) = self.fetch_json::<JobRecord>(&key).await {
                jobs.push(record);
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        jobs
    }

    /// Remove a job record
    pub async fn delete_job(&self, job_id: &str) {
        self.remove_key(&job_key(job_id)).await;
        self.drop_job_lock(job_id).await;
    }
}
