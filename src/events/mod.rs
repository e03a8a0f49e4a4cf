//! Per-job notification rooms
//!
//! Every job has a room keyed by its id. The orchestrator and dispatcher
//! publish the full job record on each status change and chunk completion;
//! WebSocket subscribers receive every update, and late joiners get a
//! snapshot from the store at subscribe time.

use crate::store::JobRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const ROOM_CAPACITY: usize = 64;

/// Broadcast hub for job progress updates
#[derive(Clone, Default)]
pub struct JobEventBus {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<JobRecord>>>>,
}

impl JobEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the room for a job, creating it when absent
    pub async fn subscribe(&self, job_id: &str) -> broadcast::Receiver<JobRecord> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Push the current job record to the job's room.
    ///
    /// A room with no subscribers drops the update; the record remains
    /// readable from the store.
    pub async fn publish(&self, job: &JobRecord) {
        let rooms = self.rooms.read().await;
        if let Some(sender) = rooms.get(&job.job_id) {
            let delivered = sender.send(job.clone()).unwrap_or(0);
            debug!(
                "Published update for {} to {} subscribers",
                job.job_id, delivered
            );
        }
    }

    /// Drop the room for a finished job
    pub async fn retire(&self, job_id: &str) {
        self.rooms.write().await.remove(job_id);
    }
}
