//! Silence-aware audio splitting
//!
//! Splits a recording at natural pauses so every chunk starts and ends in
//! silence, then coalesces short chunks up to the configured minimum
//! length. A recording with no detectable silence falls back to fixed-time
//! tiling. Output order always follows source time order.

use crate::audio::wav;
use crate::config::SplitterConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Window step when scanning for silence
const SEEK_STEP_MS: u64 = 100;

/// Speech ranges closer than this are merged into one
const RANGE_MERGE_GAP_MS: u64 = 3_000;

/// Pre/post-roll kept around each speech range
const PADDING_MS: u64 = 500;

/// Tile size used when no silence can be found
const FALLBACK_TILE_MS: u64 = 60_000;

/// Split an audio file into speech-aligned WAV chunks.
///
/// Returns the chunk paths in source time order, named
/// `<base>_partNNN.wav` under `output_dir`.
pub fn split_audio(
    file_path: &Path,
    output_dir: &Path,
    config: &SplitterConfig,
) -> Result<Vec<PathBuf>> {
    info!("Loading {}", file_path.display());
    let samples = wav::load_mono_16k(file_path)?;
    let total_ms = samples.len() as u64 / wav::SAMPLES_PER_MS as u64;
    debug!("Total duration: {:.1}s", total_ms as f64 / 1_000.0);

    let avg_dbfs = dbfs(&samples);
    let silence_thresh = config
        .silence_thresh_dbfs
        .unwrap_or_else(|| (avg_dbfs - 12.0).clamp(-60.0, -20.0));
    debug!(
        "Average loudness {:.1} dBFS, silence threshold {:.1} dBFS",
        avg_dbfs, silence_thresh
    );

    let nonsilent = detect_nonsilent(&samples, config.min_silence_len_ms, silence_thresh);

    let chunks: Vec<Vec<f32>> = if nonsilent.is_empty() {
        info!("No silence structure detected, tiling at fixed intervals");
        let mut tiles = Vec::new();
        let mut start = 0;
        while start < total_ms {
            let end = (start + FALLBACK_TILE_MS).min(total_ms);
            tiles.push(slice_ms(&samples, start, end));
            start += FALLBACK_TILE_MS;
        }
        tiles
    } else {
        debug!("Found {} non-silent ranges", nonsilent.len());
        let merged = merge_ranges(&nonsilent);
        debug!("Merged into {} ranges", merged.len());
        merged
            .iter()
            .map(|&(start, end)| {
                slice_ms(
                    &samples,
                    start.saturating_sub(PADDING_MS),
                    (end + PADDING_MS).min(total_ms),
                )
            })
            .collect()
    };

    let coalesced = coalesce_short_chunks(chunks, config.min_chunk_len_ms);

    let base = file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");

    info!("Exporting {} chunks", coalesced.len());
    let mut paths = Vec::new();
    for (i, chunk) in coalesced.iter().enumerate() {
        let out_path = output_dir.join(format!("{}_part{:03}.wav", base, i));
        wav::write_mono_16k(&out_path, chunk)?;
        debug!(
            "  {} ({:.1}s)",
            out_path.display(),
            chunk.len() as f64 / wav::TARGET_SAMPLE_RATE as f64
        );
        paths.push(out_path);
    }

    Ok(paths)
}

/// Overall loudness in dBFS relative to full scale
fn dbfs(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

/// Find ranges (in ms) that are not silence.
///
/// A stretch is silent when every sliding window of `min_silence_len_ms`
/// within it stays at or below the threshold; windows advance in
/// `SEEK_STEP_MS` steps. The non-silent ranges are the complement.
fn detect_nonsilent(samples: &[f32], min_silence_len_ms: u64, thresh_dbfs: f64) -> Vec<(u64, u64)> {
    let total_ms = samples.len() as u64 / wav::SAMPLES_PER_MS as u64;
    if total_ms == 0 {
        return Vec::new();
    }
    if total_ms < min_silence_len_ms {
        // No silence window fits; the whole file counts as speech.
        return vec![(0, total_ms)];
    }

    // Prefix sums of squared samples make each window's RMS O(1).
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    for &s in samples {
        let last = *prefix.last().unwrap_or(&0.0);
        prefix.push(last + (s as f64) * (s as f64));
    }

    let window_dbfs = |start_ms: u64, end_ms: u64| -> f64 {
        let a = (start_ms as usize * wav::SAMPLES_PER_MS).min(samples.len());
        let b = (end_ms as usize * wav::SAMPLES_PER_MS).min(samples.len());
        if b <= a {
            return f64::NEG_INFINITY;
        }
        let rms = ((prefix[b] - prefix[a]) / (b - a) as f64).sqrt();
        if rms <= 0.0 {
            f64::NEG_INFINITY
        } else {
            20.0 * rms.log10()
        }
    };

    // Union of all silent windows, merged as they are discovered in order.
    let mut silent_ranges: Vec<(u64, u64)> = Vec::new();
    let mut start = 0;
    while start + min_silence_len_ms <= total_ms {
        let end = start + min_silence_len_ms;
        if window_dbfs(start, end) <= thresh_dbfs {
            match silent_ranges.last_mut() {
                Some(last) if start <= last.1 => last.1 = end,
                _ => silent_ranges.push((start, end)),
            }
        }
        start += SEEK_STEP_MS;
    }

    let mut nonsilent = Vec::new();
    let mut cursor = 0;
    for (s, e) in silent_ranges {
        if s > cursor {
            nonsilent.push((cursor, s));
        }
        cursor = cursor.max(e);
    }
    if cursor < total_ms {
        nonsilent.push((cursor, total_ms));
    }
    nonsilent
}

/// Merge ranges whose gaps are too short to split at
fn merge_ranges(ranges: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let Some(&(first_start, first_end)) = ranges.first() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    let (mut current_start, mut current_end) = (first_start, first_end);
    for &(start, end) in &ranges[1..] {
        if start.saturating_sub(current_end) < RANGE_MERGE_GAP_MS {
            current_end = end;
        } else {
            merged.push((current_start, current_end));
            current_start = start;
            current_end = end;
        }
    }
    merged.push((current_start, current_end));
    merged
}

/// Append each too-short chunk into its running predecessor.
///
/// The final chunk is flushed as-is, so only it may end up shorter than
/// the minimum.
fn coalesce_short_chunks(chunks: Vec<Vec<f32>>, min_chunk_len_ms: u64) -> Vec<Vec<f32>> {
    let min_samples = min_chunk_len_ms as usize * wav::SAMPLES_PER_MS;
    let mut merged: Vec<Vec<f32>> = Vec::new();
    let mut current: Option<Vec<f32>> = None;

    for chunk in chunks {
        match current.as_mut() {
            None => current = Some(chunk),
            Some(running) => {
                if running.len() < min_samples {
                    running.extend_from_slice(&chunk);
                } else {
                    merged.push(std::mem::replace(running, chunk));
                }
            }
        }
    }

    if let Some(running) = current {
        merged.push(running);
    }
    merged
}

fn slice_ms(samples: &[f32], start_ms: u64, end_ms: u64) -> Vec<f32> {
    let a = (start_ms as usize * wav::SAMPLES_PER_MS).min(samples.len());
    let b = (end_ms as usize * wav::SAMPLES_PER_MS).min(samples.len());
    samples[a..b].to_vec()
}
