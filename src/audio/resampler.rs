//! Audio resampling using the rubato FFT-based resampler.
//!
//! Used when merged chunks disagree on sample rate and the caller asked for
//! conversion instead of the default keep-first-rate behaviour.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

/// Chunk size in frames for FFT-based resampling (provides good quality and performance).
const CHUNK_SIZE: usize = 1024;

/// Number of sub-chunks for FFT processing (higher = better quality but more CPU).
const SUB_CHUNKS: usize = 2;

/// Resample interleaved audio from one sample rate to another (batch processing).
///
/// The whole buffer is processed at once; the final partial chunk is zero-padded and the
/// padding trimmed from the output so the frame count tracks the rate ratio.
///
/// # Arguments
/// * `samples` - Interleaved input samples
/// * `channels` - Channel count of the input
/// * `from_rate` - Input sample rate (e.g., 22050 from one generator run)
/// * `to_rate` - Output sample rate (e.g., 24000 of the first merged chunk)
///
/// # Returns
/// Interleaved samples at the target rate.
///
/// # Errors
/// Returns an error if the resampler cannot be created or fails mid-stream.
pub fn resample(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    // No resampling needed if rates match
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let channels = channels.max(1);
    let input_frames = samples.len() / channels;

    let mut resampler = Fft::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, channels, FixedSync::Input)
        .context("Failed to create resampler")?;

    let output_frames_max = resampler.output_frames_max();
    let mut output_buffer = vec![0.0f32; output_frames_max * channels];

    let expected_frames = (input_frames as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let mut output = Vec::with_capacity((expected_frames + CHUNK_SIZE) * channels);

    let mut frame = 0;
    while frame < input_frames {
        let end = (frame + CHUNK_SIZE).min(input_frames);
        let mut chunk = samples[frame * channels..end * channels].to_vec();

        // Pad the last chunk if needed
        chunk.resize(CHUNK_SIZE * channels, 0.0);

        let input_adapter = InterleavedSlice::new(&chunk, channels, CHUNK_SIZE).context("Failed to create input adapter")?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut output_buffer, channels, output_frames_max).context("Failed to create output adapter")?;

        let (_, frames_written) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, None)
            .map_err(|e| anyhow::anyhow!("Resampling error: {}", e))?;
        output.extend_from_slice(&output_buffer[..frames_written * channels]);

        frame += CHUNK_SIZE;
    }

    // Trim the zero padding introduced by the final chunk
    output.truncate(expected_frames * channels);

    Ok(output)
}
