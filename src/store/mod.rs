//! State store for worker telemetry, job lifecycle, and user preferences
//!
//! A thin typed layer over a key/value backend. Writes carry per-record
//! TTLs refreshed on every update; backend failures during non-critical
//! updates are logged and suppressed so the calling pipeline keeps moving,
//! and reads on missing keys fall back to defaults.

pub mod backend;
pub mod jobs;
pub mod models;
pub mod workers;

pub use models::{
    ChunkRecord, ChunkStatus, JobRecord, JobStats, JobStatus, PerfSample, ResultSummary,
    StatsSnapshot, WorkerRecord, WorkerStats, WorkerStatus,
};

use crate::config::StoreConfig;
use backend::{KvBackend, MemoryBackend, RedisBackend};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Worker record TTL; an unrefreshed worker is treated as unknown/offline
pub const WORKER_TTL_SECS: u64 = 300;

/// Job record TTL
pub const JOB_TTL_SECS: u64 = 3_600;

/// User preference TTL
pub const PREFERENCE_TTL_SECS: u64 = 86_400;

/// User id used when no authentication identifies the caller
pub const DEFAULT_USER: &str = "default_user";

/// Typed facade over the key/value backend
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn KvBackend>,
    job_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl StateStore {
    /// Connect to the configured redis server, falling back to the
    /// in-process store when it is unreachable.
    pub async fn connect(config: &StoreConfig) -> Self {
        match RedisBackend::connect(&config.redis_url).await {
            Ok(backend) => Self::with_backend(Arc::new(backend)),
            Err(e) => {
                warn!("Redis connection failed ({}), using in-memory store", e);
                Self::with_backend(Arc::new(MemoryBackend::new()))
            }
        }
    }

    /// Build a store over the in-process backend
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            job_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serialize and write a record, logging and suppressing failures
    pub(crate) async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize record for {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.backend.set(key, &json, Some(ttl_secs)).await {
            warn!("Store write failed for {}: {}", key, e);
        }
    }

    /// Read and deserialize a record, treating any failure as absence
    pub(crate) async fn fetch_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = match self.backend.get(key).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                warn!("Store read failed for {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Corrupt record at {}: {}", key, e);
                None
            }
        }
    }

    pub(crate) async fn remove_key(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!("Store delete failed for {}: {}", key, e);
        }
    }

    pub(crate) async fn matching_keys(&self, pattern: &str) -> Vec<String> {
        match self.backend.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Store key scan failed for {}: {}", pattern, e);
                Vec::new()
            }
        }
    }

    /// In-process lock serializing read-modify-write cycles on one job
    pub(crate) async fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.job_locks.lock().await;
        locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) async fn drop_job_lock(&self, job_id: &str) {
        self.job_locks.lock().await.remove(job_id);
    }

    /// Store a user preference value
    pub async fn set_preference(&self, user: &str, key: &str, value: Value) {
        self.put_json(&preference_key(user, key), &value, PREFERENCE_TTL_SECS)
            .await;
    }

    /// Read a user preference value, None when unset
    pub async fn get_preference(&self, user: &str, key: &str) -> Option<Value> {
        self.fetch_json(&preference_key(user, key)).await
    }

    /// Aggregate worker and job counts for the stats endpoint
    pub async fn stats(&self) -> StatsSnapshot {
        let workers = self.list_workers().await;
        let jobs = self.list_recent_jobs(50).await;

        let online = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Online)
            .count();
        let busy = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Busy)
            .count();

        let active = jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Processing | JobStatus::Aggregating))
            .count();
        let completed = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .count();

        StatsSnapshot {
            workers: WorkerStats {
                total: workers.len(),
                online,
                busy,
                offline: workers.len() - online - busy,
            },
            jobs: JobStats {
                total: jobs.len(),
                active,
                completed,
            },
        }
    }
}

pub(crate) fn worker_key(url: &str) -> String {
    format!("worker:{}", url)
}

pub(crate) fn job_key(job_id: &str) -> String {
    format!("job:{}", job_id)
}

fn preference_key(user: &str, key: &str) -> String {
    format!("user_pref:{}:{}", user, key)
}
