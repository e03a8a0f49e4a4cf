//! Worker selection policy
//!
//! Pure scoring over worker snapshots; the dispatcher takes care of locking
//! and reservation. Workers without performance history are probed on cheap
//! chunks so their speed becomes known without risking long ones. Scored
//! candidates trade off queue depth against measured speed: fast workers
//! attract long chunks, slow workers short ones.

use super::types::WorkerSnapshot;

/// Chunks longer than this prefer measurably fast workers
const LONG_CHUNK_SEC: f64 = 60.0;

/// Chunks shorter than this are cheap enough to benchmark new workers on
const SHORT_CHUNK_SEC: f64 = 40.0;

/// Pick the best worker for a chunk of the given duration.
///
/// Returns the worker URL, or None when no worker is usable.
pub fn select_worker(snapshots: &[WorkerSnapshot], chunk_duration_sec: f64) -> Option<String> {
    let mut unbenchmarked: Vec<&WorkerSnapshot> = Vec::new();
    let mut scored: Vec<(&WorkerSnapshot, f64)> = Vec::new();

    for snapshot in snapshots {
        if !snapshot.online || snapshot.is_processing {
            continue;
        }
        if !snapshot.benchmarked {
            unbenchmarked.push(snapshot);
            continue;
        }

        let speed = snapshot.avg_speed;
        let penalty = if chunk_duration_sec > LONG_CHUNK_SEC {
            speed * 50.0
        } else if chunk_duration_sec < SHORT_CHUNK_SEC {
            (2.0 - speed) * 50.0
        } else {
            (speed - 1.0).abs() * 30.0
        };
        let score = snapshot.pending as f64 * 1_000.0 + penalty;
        scored.push((snapshot, score));
    }

    // Measure new workers on short chunks before trusting them with long ones
    if !unbenchmarked.is_empty() && chunk_duration_sec < SHORT_CHUNK_SEC {
        return Some(unbenchmarked[0].url.clone());
    }

    if scored.is_empty() {
        if let Some(snapshot) = unbenchmarked.first() {
            return Some(snapshot.url.clone());
        }
        return least_loaded(snapshots);
    }

    // Minimum score wins; the first candidate in iteration order takes ties
    let mut best = &scored[0];
    for candidate in &scored[1..] {
        if candidate.1 < best.1 {
            best = candidate;
        }
    }
    Some(best.0.url.clone())
}

/// Fallback: the least busy online worker, idle ones first
fn least_loaded(snapshots: &[WorkerSnapshot]) -> Option<String> {
    let mut idle: Vec<&WorkerSnapshot> = Vec::new();
    let mut busy: Vec<&WorkerSnapshot> = Vec::new();

    for snapshot in snapshots {
        if !snapshot.online {
            continue;
        }
        if snapshot.is_processing {
            busy.push(snapshot);
        } else {
            idle.push(snapshot);
        }
    }

    let pool = if !idle.is_empty() { idle } else { busy };
    pool.into_iter()
        .min_by_key(|s| s.pending)
        .map(|s| s.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str, pending: u32, avg_speed: Option<f64>) -> WorkerSnapshot {
        WorkerSnapshot {
            url: url.to_string(),
            online: true,
            is_processing: false,
            pending,
            benchmarked: avg_speed.is_some(),
            avg_speed: avg_speed.unwrap_or(1.0),
        }
    }

    #[test]
    fn test_fast_worker_wins_long_chunk() {
        // W1 twice realtime, W2 well below realtime, both idle
        let workers = vec![
            snapshot("http://w1", 0, Some(0.5)),
            snapshot("http://w2", 0, Some(1.5)),
        ];

        // Penalties at 80s: W1 = 25, W2 = 75
        let selected = select_worker(&workers, 80.0);
        assert_eq!(selected, Some("http://w1".to_string()));
    }

    #[test]
    fn test_unbenchmarked_worker_probed_on_short_chunk() {
        let workers = vec![
            snapshot("http://w1", 0, None),
            snapshot("http://w2", 0, Some(1.0)),
        ];

        let selected = select_worker(&workers, 30.0);
        assert_eq!(selected, Some("http://w1".to_string()));
    }

    #[test]
    fn test_unbenchmarked_worker_not_probed_on_long_chunk() {
        let workers = vec![
            snapshot("http://w1", 0, None),
            snapshot("http://w2", 0, Some(1.0)),
        ];

        let selected = select_worker(&workers, 90.0);
        assert_eq!(selected, Some("http://w2".to_string()));
    }

    #[test]
    fn test_pending_load_dominates_speed() {
        let workers = vec![
            snapshot("http://fast-but-loaded", 2, Some(0.5)),
            snapshot("http://slow-but-free", 0, Some(1.8)),
        ];

        let selected = select_worker(&workers, 90.0);
        assert_eq!(selected, Some("http://slow-but-free".to_string()));
    }

    #[test]
    fn test_midrange_chunk_prefers_realtime_worker() {
        // Between 40s and 60s the penalty is distance from realtime
        let workers = vec![
            snapshot("http://w1", 0, Some(0.2)),
            snapshot("http://w2", 0, Some(1.1)),
        ];

        let selected = select_worker(&workers, 50.0);
        assert_eq!(selected, Some("http://w2".to_string()));
    }

    #[test]
    fn test_tie_takes_first_in_order() {
        let workers = vec![
            snapshot("http://w1", 0, Some(1.0)),
            snapshot("http://w2", 0, Some(1.0)),
        ];

        let selected = select_worker(&workers, 50.0);
        assert_eq!(selected, Some("http://w1".to_string()));
    }

    #[test]
    fn test_reserved_workers_fall_back_to_least_loaded() {
        let mut w1 = snapshot("http://w1", 3, Some(0.5));
        w1.is_processing = true;
        let mut w2 = snapshot("http://w2", 1, Some(1.5));
        w2.is_processing = true;

        let selected = select_worker(&[w1, w2], 50.0);
        assert_eq!(selected, Some("http://w2".to_string()));
    }

    #[test]
    fn test_no_online_workers_returns_none() {
        let mut w1 = snapshot("http://w1", 0, Some(1.0));
        w1.online = false;

        assert_eq!(select_worker(&[w1], 50.0), None);
        assert_eq!(select_worker(&[], 50.0), None);
    }
}
