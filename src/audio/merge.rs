//! Merging per-segment audio chunks into one continuous artifact.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::codec::{self, AudioFormat, CodecError, DecodedAudio};
use super::resampler::resample;

/// What to do when decoding, concatenating or re-encoding fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeFailurePolicy {
    /// Return the first chunk's bytes unchanged and log the failure
    #[default]
    Fallback,
    /// Surface the failure to the caller
    Fail,
}

/// What to do when chunks report different sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleRatePolicy {
    /// Log the mismatch and label everything with the first chunk's rate (no conversion)
    #[default]
    Ignore,
    /// Convert mismatched chunks to the first chunk's rate
    Resample,
}

/// Merge behaviour knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub on_failure: MergeFailurePolicy,
    pub on_rate_mismatch: SampleRatePolicy,
}

/// Errors from the multi-chunk merge path.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no chunks to merge")]
    NoChunks,

    #[error("chunk {index}: {source}")]
    Codec {
        index: usize,
        #[source]
        source: CodecError,
    },

    #[error("chunk {index} has {found} channels, expected {expected}")]
    ChannelMismatch { index: usize, expected: u16, found: u16 },

    #[error("chunk {index}: {source}")]
    Resample {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("re-encoding merged audio: {0}")]
    Encode(#[source] CodecError),
}

/// Encoded audio produced for one segment.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub bytes: Vec<u8>,   // Encoded audio exactly as the model wrote it
    pub sample_rate: u32, // Reported sample rate
    pub frames: usize,    // Decoded samples per channel
    pub channels: u16,    // Channel count
}

impl AudioChunk {
    /// Wrap model output, decoding it once to capture rate and length.
    ///
    /// # Errors
    /// Returns an error if the bytes cannot be decoded in `format`.
    pub fn from_bytes(bytes: Vec<u8>, format: AudioFormat) -> Result<Self, CodecError> {
        let decoded = codec::decode(&bytes, format)?;
        Ok(Self { frames: decoded.frames(), sample_rate: decoded.sample_rate, channels: decoded.channels, bytes })
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Result of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub bytes: Vec<u8>,         // Final encoded audio
    pub segments_merged: usize, // Chunks actually represented in `bytes`
}

/// Merge chunks into one encoded buffer, applying the failure policy.
///
/// A single chunk passes through byte-for-byte. Multiple chunks are decoded,
/// concatenated in order and re-encoded once.
///
/// # Arguments
/// * `chunks` - Per-segment audio, in segment order
/// * `format` - Encoding of the chunks and of the result
/// * `options` - Failure and sample-rate policies
///
/// # Errors
/// Only under `MergeFailurePolicy::Fail`, or when `chunks` is empty.
pub fn merge_chunks(chunks: &[AudioChunk], format: AudioFormat, options: &MergeOptions) -> Result<MergeOutcome, MergeError> {
    match chunks {
        [] => Err(MergeError::NoChunks),
        [only] => Ok(MergeOutcome { bytes: only.bytes.clone(), segments_merged: 1 }),
        [first, ..] => {
            info!("Merging {} audio segments...", chunks.len());
            match concatenate(chunks, format, options.on_rate_mismatch) {
                Ok(bytes) => Ok(MergeOutcome { bytes, segments_merged: chunks.len() }),
                Err(e) if options.on_failure == MergeFailurePolicy::Fallback => {
                    warn!("Error merging audio segments: {}. Returning the first segment only", e);
                    Ok(MergeOutcome { bytes: first.bytes.clone(), segments_merged: 1 })
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Decode, concatenate along the time axis and re-encode.
fn concatenate(chunks: &[AudioChunk], format: AudioFormat, rate_policy: SampleRatePolicy) -> Result<Vec<u8>, MergeError> {
    let decoded = chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| codec::decode(&chunk.bytes, format).map_err(|source| MergeError::Codec { index, source }))
        .collect::<Result<Vec<_>, _>>()?;

    let target_rate = decoded[0].sample_rate;
    let channels = decoded[0].channels;

    let rates: Vec<u32> = decoded.iter().map(|d| d.sample_rate).collect();
    if rates.iter().any(|&rate| rate != target_rate) {
        match rate_policy {
            SampleRatePolicy::Ignore => warn!("Different sample rates found {:?}. Using {} Hz without resampling", rates, target_rate),
            SampleRatePolicy::Resample => info!("Different sample rates found {:?}. Resampling to {} Hz", rates, target_rate),
        }
    }

    let total_samples = decoded.iter().map(|d| d.samples.len()).sum();
    let mut merged = DecodedAudio { samples: Vec::with_capacity(total_samples), sample_rate: target_rate, channels };

    for (index, audio) in decoded.into_iter().enumerate() {
        if audio.channels != channels {
            return Err(MergeError::ChannelMismatch { index, expected: channels, found: audio.channels });
        }

        if audio.sample_rate != target_rate && rate_policy == SampleRatePolicy::Resample {
            let converted = resample(&audio.samples, channels as usize, audio.sample_rate, target_rate)
                .map_err(|source| MergeError::Resample { index, source })?;
            merged.samples.extend_from_slice(&converted);
        } else {
            merged.samples.extend_from_slice(&audio.samples);
        }
    }

    debug!("Merged {} frames at {} Hz, {} channel(s)", merged.frames(), target_rate, channels);
    codec::encode(&merged, format).map_err(MergeError::Encode)
}

/// Measure the final artifact: sample rate and duration from its decoded frames.
///
/// # Errors
/// Returns an error if the artifact cannot be decoded.
pub fn measure(bytes: &[u8], format: AudioFormat) -> Result<(u32, f64), CodecError> {
    let decoded = codec::decode(bytes, format)?;
    Ok((decoded.sample_rate, decoded.duration_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(format: AudioFormat, frames: usize, channels: u16, sample_rate: u32, level: f32) -> AudioChunk {
        let audio = DecodedAudio { samples: vec![level; frames * channels as usize], sample_rate, channels };
        let bytes = codec::encode(&audio, format).unwrap();
        AudioChunk::from_bytes(bytes, format).unwrap()
    }

    fn wav_chunk(frames: usize, channels: u16, sample_rate: u32, level: f32) -> AudioChunk {
        chunk(AudioFormat::Wav, frames, channels, sample_rate, level)
    }

    #[test]
    fn test_single_chunk_passthrough_is_bit_exact() {
        // Hand-built bytes that would not survive a decode/re-encode cycle unchanged
        let spec = hound::WavSpec { channels: 1, sample_rate: 24000, bits_per_sample: 32, sample_format: hound::SampleFormat::Float };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..100 {
                writer.write_sample(i as f32 / 1000.0).unwrap();
            }
            writer.finalize().unwrap();
        }
        let bytes = cursor.into_inner();
        let chunk = AudioChunk::from_bytes(bytes.clone(), AudioFormat::Wav).unwrap();

        let outcome = merge_chunks(&[chunk], AudioFormat::Wav, &MergeOptions::default()).unwrap();
        assert_eq!(outcome.bytes, bytes);
        assert_eq!(outcome.segments_merged, 1);
    }

    #[test]
    fn test_merge_duration_is_sum_of_frames() {
        let chunks = vec![wav_chunk(24000, 1, 24000, 0.1), wav_chunk(12000, 1, 24000, -0.1)];
        let outcome = merge_chunks(&chunks, AudioFormat::Wav, &MergeOptions::default()).unwrap();

        let (rate, duration) = measure(&outcome.bytes, AudioFormat::Wav).unwrap();
        assert_eq!(rate, 24000);
        assert!((duration - 1.5).abs() <= 1.0 / 24000.0);
        assert_eq!(outcome.segments_merged, 2);
    }

    #[test]
    fn test_merge_keeps_segment_order() {
        let chunks = vec![wav_chunk(10, 1, 8000, 0.5), wav_chunk(10, 1, 8000, -0.5)];
        let outcome = merge_chunks(&chunks, AudioFormat::Wav, &MergeOptions::default()).unwrap();
        let decoded = codec::decode(&outcome.bytes, AudioFormat::Wav).unwrap();

        assert_eq!(decoded.samples.len(), 20);
        assert!(decoded.samples[..10].iter().all(|&s| s > 0.0));
        assert!(decoded.samples[10..].iter().all(|&s| s < 0.0));
    }

    #[test]
    fn test_merge_stereo_concatenates_frames() {
        let chunks = vec![wav_chunk(100, 2, 16000, 0.2), wav_chunk(50, 2, 16000, 0.2), wav_chunk(25, 2, 16000, 0.2)];
        let outcome = merge_chunks(&chunks, AudioFormat::Wav, &MergeOptions::default()).unwrap();
        let decoded = codec::decode(&outcome.bytes, AudioFormat::Wav).unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 175);
    }

    #[test]
    fn test_rate_mismatch_ignored_uses_first_rate() {
        let chunks = vec![wav_chunk(24000, 1, 24000, 0.1), wav_chunk(22050, 1, 22050, 0.1)];
        let outcome = merge_chunks(&chunks, AudioFormat::Wav, &MergeOptions::default()).unwrap();
        let decoded = codec::decode(&outcome.bytes, AudioFormat::Wav).unwrap();

        // Samples are concatenated as-is and labelled with the first rate
        assert_eq!(decoded.sample_rate, 24000);
        assert_eq!(decoded.frames(), 24000 + 22050);
        assert_eq!(outcome.segments_merged, 2);
    }

    #[test]
    fn test_rate_mismatch_resampled() {
        let chunks = vec![wav_chunk(24000, 1, 24000, 0.0), wav_chunk(48000, 1, 48000, 0.0)];
        let options = MergeOptions { on_rate_mismatch: SampleRatePolicy::Resample, ..Default::default() };
        let outcome = merge_chunks(&chunks, AudioFormat::Wav, &options).unwrap();

        let (rate, duration) = measure(&outcome.bytes, AudioFormat::Wav).unwrap();
        assert_eq!(rate, 24000);
        assert!((duration - 2.0).abs() < 0.05, "duration {}", duration);
    }

    #[test]
    fn test_channel_mismatch_falls_back_to_first_chunk() {
        let chunks = vec![wav_chunk(100, 1, 8000, 0.1), wav_chunk(100, 2, 8000, 0.1)];
        let outcome = merge_chunks(&chunks, AudioFormat::Wav, &MergeOptions::default()).unwrap();

        assert_eq!(outcome.bytes, chunks[0].bytes);
        assert_eq!(outcome.segments_merged, 1);
    }

    #[test]
    fn test_failure_policy_fail_surfaces_error() {
        let chunks = vec![wav_chunk(100, 1, 8000, 0.1), wav_chunk(100, 2, 8000, 0.1)];
        let options = MergeOptions { on_failure: MergeFailurePolicy::Fail, ..Default::default() };
        let result = merge_chunks(&chunks, AudioFormat::Wav, &options);

        assert!(matches!(result, Err(MergeError::ChannelMismatch { index: 1, expected: 1, found: 2 })));
    }

    #[test]
    fn test_flac_merge_duration_is_sum_of_frames() {
        let chunks = vec![chunk(AudioFormat::Flac, 24000, 1, 24000, 0.1), chunk(AudioFormat::Flac, 12000, 1, 24000, -0.1)];
        let outcome = merge_chunks(&chunks, AudioFormat::Flac, &MergeOptions::default()).unwrap();

        assert_eq!(outcome.segments_merged, 2);
        assert_eq!(&outcome.bytes[..4], b"fLaC");
        let (rate, duration) = measure(&outcome.bytes, AudioFormat::Flac).unwrap();
        assert_eq!(rate, 24000);
        assert!((duration - 1.5).abs() <= 1.0 / 24000.0);
    }

    #[test]
    fn test_lossy_merge_duration_is_sum_of_frames() {
        for (format, encoder) in [(AudioFormat::Mp3, "libmp3lame"), (AudioFormat::Ogg, "libvorbis")] {
            if !codec::ffmpeg_has_encoder(encoder) {
                eprintln!("skipping {}: ffmpeg with {} not available", format, encoder);
                continue;
            }

            let chunks = vec![chunk(format, 24000, 1, 24000, 0.1), chunk(format, 12000, 1, 24000, -0.1)];
            let options = MergeOptions { on_failure: MergeFailurePolicy::Fail, ..Default::default() };
            let outcome = merge_chunks(&chunks, format, &options).unwrap();

            assert_eq!(outcome.segments_merged, 2);
            let (rate, duration) = measure(&outcome.bytes, format).unwrap();
            assert_eq!(rate, 24000);
            // Lossy codecs pad to whole frames
            assert!((duration - 1.5).abs() < 0.2, "{}: {}s", format, duration);
        }
    }

    #[test]
    fn test_undecodable_chunks_fall_back() {
        let chunks = vec![
            AudioChunk { bytes: vec![1, 2, 3], sample_rate: 24000, frames: 10, channels: 1 },
            AudioChunk { bytes: vec![4, 5, 6], sample_rate: 24000, frames: 10, channels: 1 },
        ];
        let outcome = merge_chunks(&chunks, AudioFormat::Flac, &MergeOptions::default()).unwrap();
        assert_eq!(outcome.bytes, vec![1, 2, 3]);
        assert_eq!(outcome.segments_merged, 1);

        let options = MergeOptions { on_failure: MergeFailurePolicy::Fail, ..Default::default() };
        assert!(matches!(merge_chunks(&chunks, AudioFormat::Flac, &options), Err(MergeError::Codec { index: 0, .. })));
    }

    #[test]
    fn test_no_chunks_is_an_error() {
        assert!(matches!(merge_chunks(&[], AudioFormat::Wav, &MergeOptions::default()), Err(MergeError::NoChunks)));
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = wav_chunk(12000, 1, 24000, 0.0);
        assert_eq!(chunk.frames, 12000);
        assert!((chunk.duration_secs() - 0.5).abs() < 1e-9);
    }
}
