//! Transcript aggregation
//!
//! Stitches per-chunk transcripts into one timeline. Each chunk reports
//! segment times relative to its own start, so every segment is shifted by
//! the sum of the durations of all preceding chunks. The offset advances
//! for failed chunks too: their audio still occupies source time, and
//! skipping it would misalign every later segment.

use crate::dispatch::types::TranscriptResult;
use serde::{Deserialize, Serialize};

/// One segment of the final transcript, in source-time coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedSegment {
    /// Formatted start time, `HH:MM:SS.mmm`
    pub start: String,
    /// Formatted end time, `HH:MM:SS.mmm`
    pub end: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Aggregated transcript for a whole recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedTranscript {
    pub text: String,
    pub total_processing_time_ms: u64,
    pub segments_count: usize,
    pub segments: Vec<AlignedSegment>,
}

/// Combine per-chunk results into a single timestamped transcript.
///
/// `results` and `chunk_durations_ms` are parallel, indexed by original
/// chunk order; a None result marks a chunk whose worker failed.
pub fn aggregate_results(
    results: &[Option<TranscriptResult>],
    chunk_durations_ms: &[u64],
) -> AggregatedTranscript {
    let mut full_text = String::new();
    let mut total_time_ms = 0;
    let mut segments = Vec::new();

    let mut offset_ms = 0;
    for (i, result) in results.iter().enumerate() {
        if let Some(result) = result {
            let text = result.text.trim();
            if !text.is_empty() {
                full_text.push_str(text);
                full_text.push('\n');
            }

            total_time_ms += result.time_ms;

            for segment in &result.segments {
                let start_ms = segment.start_ms + offset_ms;
                let end_ms = segment.end_ms + offset_ms;
                segments.push(AlignedSegment {
                    start: format_timestamp(start_ms),
                    end: format_timestamp(end_ms),
                    start_ms,
                    end_ms,
                    text: segment.text.clone(),
                });
            }
        }

        offset_ms += chunk_durations_ms.get(i).copied().unwrap_or(0);
    }

    AggregatedTranscript {
        text: full_text.trim().to_string(),
        total_processing_time_ms: total_time_ms,
        segments_count: segments.len(),
        segments,
    }
}

/// Render milliseconds as `HH:MM:SS.mmm`
pub fn format_timestamp(milliseconds: u64) -> String {
    let mut ms = milliseconds;
    let hours = ms / 3_600_000;
    ms %= 3_600_000;
    let minutes = ms / 60_000;
    ms %= 60_000;
    let seconds = ms / 1_000;
    ms %= 1_000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::types::TranscriptSegment;

    fn result(text: &str, time_ms: u64, segments: &[(u64, u64, &str)]) -> TranscriptResult {
        TranscriptResult {
            text: text.to_string(),
            time_ms,
            segments: segments
                .iter()
                .map(|&(start_ms, end_ms, text)| TranscriptSegment {
                    start_ms,
                    end_ms,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_two_successful_chunks_shift_by_chunk_duration() {
        // Given
        let results = vec![
            Some(result("a", 100, &[(1_000, 5_000, "a")])),
            Some(result("b", 200, &[(0, 4_000, "b")])),
        ];
        let durations = vec![10_000, 15_000];

        // When
        let aggregated = aggregate_results(&results, &durations);

        // Then
        assert_eq!(aggregated.text, "a\nb");
        assert_eq!(aggregated.total_processing_time_ms, 300);
        assert_eq!(aggregated.segments_count, 2);
        assert_eq!(aggregated.segments[0].start_ms, 1_000);
        assert_eq!(aggregated.segments[0].end_ms, 5_000);
        assert_eq!(aggregated.segments[1].start_ms, 10_000);
        assert_eq!(aggregated.segments[1].end_ms, 14_000);
    }

    #[test]
    fn test_failed_middle_chunk_still_advances_offset() {
        // Given three 5s chunks where the middle one failed
        let results = vec![
            Some(result("x", 10, &[(0, 1_000, "x")])),
            None,
            Some(result("z", 10, &[(0, 1_000, "z")])),
        ];
        let durations = vec![5_000, 5_000, 5_000];

        // When
        let aggregated = aggregate_results(&results, &durations);

        // Then later segments stay aligned to the source timeline
        assert_eq!(aggregated.text, "x\nz");
        assert_eq!(aggregated.segments_count, 2);
        assert_eq!(aggregated.segments[0].start_ms, 0);
        assert_eq!(aggregated.segments[1].start_ms, 10_000);
    }

    #[test]
    fn test_all_failed_chunks_produce_empty_transcript() {
        let results = vec![None, None];
        let durations = vec![5_000, 5_000];

        let aggregated = aggregate_results(&results, &durations);

        assert_eq!(aggregated.text, "");
        assert_eq!(aggregated.total_processing_time_ms, 0);
        assert_eq!(aggregated.segments_count, 0);
        assert!(aggregated.segments.is_empty());
    }

    #[test]
    fn test_segments_sorted_when_all_chunks_succeed() {
        let results = vec![
            Some(result("a", 1, &[(0, 500, "a1"), (600, 900, "a2")])),
            Some(result("b", 1, &[(100, 300, "b1")])),
            Some(result("c", 1, &[(0, 200, "c1")])),
        ];
        let durations = vec![1_000, 1_000, 1_000];

        let aggregated = aggregate_results(&results, &durations);

        let starts: Vec<u64> = aggregated.segments.iter().map(|s| s.start_ms).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn test_blank_text_is_not_appended() {
        let results = vec![
            Some(result("  ", 5, &[])),
            Some(result("speech", 5, &[])),
        ];
        let durations = vec![1_000, 1_000];

        let aggregated = aggregate_results(&results, &durations);

        assert_eq!(aggregated.text, "speech");
        assert_eq!(aggregated.total_processing_time_ms, 10);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "00:00:00.000");
        assert_eq!(format_timestamp(3_661_234), "01:01:01.234");
        assert_eq!(format_timestamp(59_999), "00:00:59.999");
        assert_eq!(format_timestamp(60_000), "00:01:00.000");
    }
}
