//! Typed records persisted in the state store
//!
//! The serialized shapes of these records are wire-visible: job records are
//! returned verbatim from the HTTP API and pushed over the notification
//! channel, so field names and status spellings are part of the contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::aggregator::AggregatedTranscript;

/// Maximum number of performance samples retained per worker
pub const PERFORMANCE_HISTORY_CAP: usize = 20;

/// Number of recent samples that inform scheduling decisions
pub const PERFORMANCE_WINDOW: usize = 10;

/// Worker availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Online,
    Offline,
    Busy,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Online => write!(f, "online"),
            WorkerStatus::Offline => write!(f, "offline"),
            WorkerStatus::Busy => write!(f, "busy"),
        }
    }
}

/// One measured chunk transcription, used to rank workers by speed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSample {
    pub chunk_duration_sec: f64,
    pub processing_time_sec: f64,
    /// processing_time / chunk_duration; below 1.0 means faster than realtime
    pub speed_ratio: f64,
    pub timestamp: DateTime<Utc>,
}

/// Telemetry record for one transcription worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub url: String,
    pub status: WorkerStatus,
    /// Advisory flag set while a dispatch decision has this worker reserved
    pub is_processing: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub pending_chunks: u32,
    #[serde(default)]
    pub performance_history: Vec<PerfSample>,
}

impl WorkerRecord {
    /// Create a fresh online record for a worker URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: WorkerStatus::Online,
            is_processing: false,
            last_updated: Utc::now(),
            metadata: Value::Object(Default::default()),
            pending_chunks: 0,
            performance_history: Vec::new(),
        }
    }

    /// Whether at least one performance sample has been recorded
    pub fn is_benchmarked(&self) -> bool {
        !self.performance_history.is_empty()
    }

    /// Append a performance sample, keeping only the most recent entries
    pub fn record_sample(&mut self, chunk_duration_sec: f64, processing_time_sec: f64) {
        let speed_ratio = if chunk_duration_sec > 0.0 {
            processing_time_sec / chunk_duration_sec
        } else {
            1.0
        };
        self.performance_history.push(PerfSample {
            chunk_duration_sec,
            processing_time_sec,
            speed_ratio,
            timestamp: Utc::now(),
        });
        if self.performance_history.len() > PERFORMANCE_HISTORY_CAP {
            let excess = self.performance_history.len() - PERFORMANCE_HISTORY_CAP;
            self.performance_history.drain(..excess);
        }
    }

    /// Mean speed ratio over the most recent samples, 1.0 without history
    pub fn avg_speed_ratio(&self) -> f64 {
        if self.performance_history.is_empty() {
            return 1.0;
        }
        let recent: Vec<_> = self
            .performance_history
            .iter()
            .rev()
            .take(PERFORMANCE_WINDOW)
            .collect();
        recent.iter().map(|s| s.speed_ratio).sum::<f64>() / recent.len() as f64
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Purifying,
    PurifierCompleted,
    PurifierBypassed,
    Splitting,
    Processing,
    Aggregating,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Created => "created",
            JobStatus::Purifying => "purifying",
            JobStatus::PurifierCompleted => "purifier_completed",
            JobStatus::PurifierBypassed => "purifier_bypassed",
            JobStatus::Splitting => "splitting",
            JobStatus::Processing => "processing",
            JobStatus::Aggregating => "aggregating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Per-chunk dispatch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Processing,
    Completed,
}

/// Compact description of a chunk's transcription outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub text_length: usize,
    pub segments_count: usize,
}

/// One dispatched chunk within a job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub worker_url: String,
    pub status: ChunkStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
}

/// Lifecycle record for one submitted recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    pub total_chunks: u32,
    pub completed_chunks: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunks: Vec<ChunkRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AggregatedTranscript>,
}

impl JobRecord {
    /// Create a new job record in the `created` state
    pub fn new(job_id: impl Into<String>, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: JobStatus::Created,
            total_chunks: 0,
            completed_chunks: 0,
            created_at: now,
            updated_at: now,
            chunks: Vec::new(),
            result: None,
        }
    }

    /// Recount completed chunks from the chunk list
    pub fn recount_completed(&mut self) {
        self.completed_chunks = self
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Completed)
            .count() as u32;
    }
}

/// Aggregate counts reported by the stats endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub workers: WorkerStats,
    pub jobs: JobStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStats {
    pub total: usize,
    pub online: usize,
    pub busy: usize,
    pub offline: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}
