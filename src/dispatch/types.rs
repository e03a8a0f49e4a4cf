//! Dispatch-related type definitions

use serde::{Deserialize, Serialize};

/// One timed segment within a worker's transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub start_ms: u64,
    #[serde(default)]
    pub end_ms: u64,
    #[serde(default)]
    pub text: String,
}

/// Response body of a worker's transcribe endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub time_ms: u64,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

/// A worker that answered its health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineWorker {
    pub id: usize,
    pub url: String,
    pub status: String,
}

/// Point-in-time view of one worker used for scheduling decisions
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub url: String,
    pub online: bool,
    pub is_processing: bool,
    pub pending: u32,
    pub benchmarked: bool,
    /// Mean speed ratio of recent samples; lower is faster
    pub avg_speed: f64,
}
