//! WAV loading, duration probing, and chunk export
//!
//! Chunk artifacts are always 16 kHz mono 16-bit PCM. Input recordings in
//! other rates or channel layouts are downmixed and linearly resampled on
//! load.

use crate::error::{AppError, Result};
use std::path::Path;

/// Sample rate of every chunk artifact
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Samples per millisecond at the target rate
pub const SAMPLES_PER_MS: usize = (TARGET_SAMPLE_RATE / 1_000) as usize;

/// Load a WAV file as mono f32 samples at 16 kHz
pub fn load_mono_16k(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono = downmix(&samples, spec.channels);
    Ok(resample_linear(&mono, spec.sample_rate, TARGET_SAMPLE_RATE))
}

/// Duration of a WAV file in milliseconds, read from the header
pub fn duration_ms(path: &Path) -> Result<u64> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AppError::audio(format!(
            "Zero sample rate in {}",
            path.display()
        )));
    }
    let frames = reader.duration() as u64;
    Ok(frames * 1_000 / spec.sample_rate as u64)
}

/// Write mono f32 samples as a 16 kHz 16-bit PCM WAV file
pub fn write_mono_16k(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Average interleaved frames down to a single channel
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampling between arbitrary rates
fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;
    let mut resampled = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        if src_idx + 1 < samples.len() {
            resampled.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            resampled.push(samples[src_idx]);
        }
    }

    resampled
}
