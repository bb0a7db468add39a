//! Synthesis-and-merge pipeline.
//!
//! Drives the model once per segment, strictly in order, then merges the
//! per-segment audio into one artifact with a duration measured from the result.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::SynthesisError;
use super::model::{GenerationParams, GenerationRequest, ModelJob, SharedModel};
use super::segmenter::Segmenter;
use crate::audio::merge::{self, AudioChunk, MergeOptions};
use crate::audio::AudioFormat;

/// Final merged audio plus metadata.
#[derive(Debug, Clone)]
pub struct MergedAudio {
    pub bytes: Vec<u8>,            // Encoded audio
    pub duration_secs: f64,        // Measured from the merged artifact
    pub sample_rate: u32,          // Sample rate of the merged artifact
    pub format: AudioFormat,       // Encoding of `bytes`
    pub segments_generated: usize, // Segments sent to the model
    pub segments_merged: usize,    // Segments actually present in `bytes`
}

/// Metadata of a [`MergedAudio`], without the audio itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AudioSummary {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub format: AudioFormat,
    pub segments_generated: usize,
    pub segments_merged: usize,
    pub size_bytes: usize,
}

impl MergedAudio {
    pub fn summary(&self) -> AudioSummary {
        AudioSummary {
            duration_secs: self.duration_secs,
            sample_rate: self.sample_rate,
            format: self.format,
            segments_generated: self.segments_generated,
            segments_merged: self.segments_merged,
            size_bytes: self.bytes.len(),
        }
    }
}

/// Segment, synthesize and merge. Cheap to clone; clones share the model.
#[derive(Clone)]
pub struct Pipeline {
    model: SharedModel,           // Single model instance, locked per segment
    segmenter: Segmenter,         // Text splitting bounds
    merge: MergeOptions,          // Merge failure / sample-rate policies
    scratch_root: Option<PathBuf>, // Parent of per-segment scratch dirs (system temp if unset)
}

impl Pipeline {
    /// Create a new pipeline.
    ///
    /// # Arguments
    /// * `model` - Shared speech model
    /// * `segmenter` - Text segmenter
    /// * `merge` - Merge policies
    pub fn new(model: SharedModel, segmenter: Segmenter, merge: MergeOptions) -> Self {
        Self { model, segmenter, merge, scratch_root: None }
    }

    /// Create per-segment scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// The segmenter this pipeline splits text with.
    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Split the request text and synthesize every segment.
    ///
    /// # Errors
    /// See [`Pipeline::synthesize`].
    pub fn generate(&self, request: &GenerationRequest) -> Result<MergedAudio, SynthesisError> {
        let segments = self.segmenter.split(&request.text);
        info!("Split text into {} segments ({} mode)", segments.len(), request.params.voice.mode());
        self.synthesize(&segments, &request.params)
    }

    /// Synthesize ordered segments and merge the results.
    ///
    /// Segments are generated one at a time. The first segment that fails aborts the
    /// request; nothing generated before it is returned.
    ///
    /// # Arguments
    /// * `segments` - Ordered, non-empty segment texts
    /// * `params` - Voice and generation parameters shared by all segments
    ///
    /// # Returns
    /// The merged audio with its measured duration.
    ///
    /// # Errors
    /// Returns an error if a segment produces no audio, if its audio cannot be decoded,
    /// or if merging fails under `MergeFailurePolicy::Fail`.
    pub fn synthesize(&self, segments: &[String], params: &GenerationParams) -> Result<MergedAudio, SynthesisError> {
        if segments.is_empty() {
            return Err(SynthesisError::NoSegments);
        }

        let total = segments.len();
        let mut chunks = Vec::with_capacity(total);

        for (i, text) in segments.iter().enumerate() {
            info!("🎵 Generating segment {}/{} ({} chars)", i + 1, total, text.chars().count());
            chunks.push(self.synthesize_segment(i + 1, total, text, params)?);
        }

        let outcome = merge::merge_chunks(&chunks, params.format, &self.merge)?;

        let (sample_rate, duration_secs) = measure_or_estimate(&outcome.bytes, params.format, &chunks, outcome.segments_merged);

        info!("✅ Generated {:.2}s of audio from {} segment(s)", duration_secs, total);

        Ok(MergedAudio {
            bytes: outcome.bytes,
            duration_secs,
            sample_rate,
            format: params.format,
            segments_generated: total,
            segments_merged: outcome.segments_merged,
        })
    }

    /// Run the model for one segment inside its own scratch directory.
    fn synthesize_segment(&self, segment: usize, total: usize, text: &str, params: &GenerationParams) -> Result<AudioChunk, SynthesisError> {
        // Removed when dropped, on every exit path
        let mut builder = tempfile::Builder::new();
        builder.prefix("longform-tts-");
        let workdir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let prefix = workdir.path().join(format!("segment-{:03}", segment));

        let output = {
            let mut model = self.model.lock();
            let output = model.output_file(&prefix, params.format);
            let job = ModelJob { text, params, output_prefix: &prefix };
            model.generate(&job).map_err(|source| SynthesisError::Model { segment, total, source })?;
            output
        };

        if !output.exists() {
            return Err(SynthesisError::MissingOutput { segment, total, path: output });
        }

        let bytes = std::fs::read(&output)?;
        let chunk = AudioChunk::from_bytes(bytes, params.format).map_err(|source| SynthesisError::Decode { segment, source })?;

        debug!("Segment {}/{}: {} frames @ {} Hz ({:.2}s)", segment, total, chunk.frames, chunk.sample_rate, chunk.duration_secs());
        Ok(chunk)
    }
}

/// Sample rate and duration of merged audio.
///
/// Measured from `bytes` when they decode. Otherwise the durations of the first
/// `segments_merged` chunks are summed and the first chunk's rate is reported.
fn measure_or_estimate(bytes: &[u8], format: AudioFormat, chunks: &[AudioChunk], segments_merged: usize) -> (u32, f64) {
    match merge::measure(bytes, format) {
        Ok(measured) => measured,
        Err(e) => {
            warn!("Could not measure merged audio ({}), using per-segment durations", e);
            let duration = chunks.iter().take(segments_merged).map(AudioChunk::duration_secs).sum();
            (chunks.first().map_or(0, |c| c.sample_rate), duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use anyhow::Result;
    use parking_lot::Mutex;

    use super::*;
    use crate::audio::codec::{self, DecodedAudio};
    use crate::audio::{MergeFailurePolicy, SampleRatePolicy};
    use crate::tts::model::{self, Mode, SpeechModel, VoiceSelection};

    /// What the mock does on a given call.
    #[derive(Debug, Clone, Copy)]
    enum Step {
        Write { frames: usize, sample_rate: u32, channels: u16 },
        Skip,
        Fail,
    }

    #[derive(Debug, Clone)]
    struct Call {
        text: String,
        mode: Mode,
        prefix: PathBuf,
    }

    /// Records every call and writes real WAV files.
    struct MockModel {
        steps: Vec<Step>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl MockModel {
        fn new(steps: Vec<Step>) -> (Self, Arc<Mutex<Vec<Call>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (Self { steps, calls: calls.clone() }, calls)
        }
    }

    impl SpeechModel for MockModel {
        fn name(&self) -> &str {
            "mock"
        }

        fn generate(&mut self, job: &ModelJob<'_>) -> Result<()> {
            let index = {
                let mut calls = self.calls.lock();
                calls.push(Call { text: job.text.to_string(), mode: job.params.voice.mode(), prefix: job.output_prefix.to_path_buf() });
                calls.len() - 1
            };

            match self.steps[index.min(self.steps.len() - 1)] {
                Step::Write { frames, sample_rate, channels } => {
                    let audio = DecodedAudio { samples: vec![0.25; frames * channels as usize], sample_rate, channels };
                    let bytes = codec::encode(&audio, job.params.format)?;
                    std::fs::write(self.output_file(job.output_prefix, job.params.format), bytes)?;
                    Ok(())
                }
                Step::Skip => Ok(()),
                Step::Fail => anyhow::bail!("model crashed"),
            }
        }
    }

    fn preset_params() -> GenerationParams {
        GenerationParams {
            voice: VoiceSelection::Preset { voice: "af_heart".into() },
            speed: 1.0,
            temperature: 0.7,
            format: AudioFormat::Wav,
        }
    }

    fn pipeline(steps: Vec<Step>, merge: MergeOptions) -> (Pipeline, Arc<Mutex<Vec<Call>>>) {
        let (mock, calls) = MockModel::new(steps);
        (Pipeline::new(model::shared(Box::new(mock)), Segmenter::default(), merge), calls)
    }

    fn mono(frames: usize) -> Step {
        Step::Write { frames, sample_rate: 24000, channels: 1 }
    }

    fn segments(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Segment number {} of the request.", i)).collect()
    }

    fn workdir_of(prefix: &Path) -> PathBuf {
        prefix.parent().unwrap().to_path_buf()
    }

    #[test]
    fn test_single_segment_returns_model_bytes() {
        let (pipeline, _) = pipeline(vec![mono(4800)], MergeOptions::default());
        let result = pipeline.synthesize(&segments(1), &preset_params()).unwrap();

        let expected = codec::encode(&DecodedAudio { samples: vec![0.25; 4800], sample_rate: 24000, channels: 1 }, AudioFormat::Wav).unwrap();
        assert_eq!(result.bytes, expected);
        assert_eq!(result.segments_generated, 1);
        assert_eq!(result.segments_merged, 1);
        assert!((result.duration_secs - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_two_chunks_merge_to_summed_duration() {
        let (pipeline, calls) = pipeline(vec![mono(24000), mono(12000)], MergeOptions::default());
        let result = pipeline.synthesize(&segments(2), &preset_params()).unwrap();

        assert_eq!(calls.lock().len(), 2);
        assert_eq!(result.sample_rate, 24000);
        assert!((result.duration_secs - 1.5).abs() <= 1.0 / 24000.0);
        assert_eq!(result.segments_generated, 2);
        assert_eq!(result.segments_merged, 2);
    }

    #[test]
    fn test_summary_serializes_metadata_only() {
        let (pipeline, _) = pipeline(vec![mono(2400)], MergeOptions::default());
        let result = pipeline.synthesize(&segments(1), &preset_params()).unwrap();

        let json = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(json["sample_rate"], 24000);
        assert_eq!(json["format"], "wav");
        assert_eq!(json["segments_merged"], 1);
        assert_eq!(json["size_bytes"], result.bytes.len());
        assert!(json.get("bytes").is_none());
    }

    #[test]
    fn test_segments_are_sent_in_order() {
        let (pipeline, calls) = pipeline(vec![mono(100)], MergeOptions::default());
        let texts = segments(3);
        pipeline.synthesize(&texts, &preset_params()).unwrap();

        let sent: Vec<String> = calls.lock().iter().map(|c| c.text.clone()).collect();
        assert_eq!(sent, texts);
    }

    #[test]
    fn test_missing_output_aborts_request() {
        let (pipeline, calls) = pipeline(vec![mono(100), Step::Skip, mono(100)], MergeOptions::default());
        let result = pipeline.synthesize(&segments(3), &preset_params());

        assert!(matches!(result, Err(SynthesisError::MissingOutput { segment: 2, total: 3, .. })));
        // Segment 3 is never attempted
        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn test_model_error_aborts_request() {
        let (pipeline, calls) = pipeline(vec![Step::Fail], MergeOptions::default());
        let result = pipeline.synthesize(&segments(2), &preset_params());

        match result {
            Err(SynthesisError::Model { segment, total, source }) => {
                assert_eq!((segment, total), (1, 2));
                assert!(source.to_string().contains("model crashed"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_scratch_directories_are_removed() {
        let (pipeline, calls) = pipeline(vec![mono(100), mono(100)], MergeOptions::default());
        pipeline.synthesize(&segments(2), &preset_params()).unwrap();

        for call in calls.lock().iter() {
            assert!(!workdir_of(&call.prefix).exists(), "left behind: {}", call.prefix.display());
        }
    }

    #[test]
    fn test_scratch_directories_removed_on_failure() {
        let (pipeline, calls) = pipeline(vec![mono(100), Step::Skip], MergeOptions::default());
        assert!(pipeline.synthesize(&segments(2), &preset_params()).is_err());

        for call in calls.lock().iter() {
            assert!(!workdir_of(&call.prefix).exists());
        }
    }

    #[test]
    fn test_merge_fallback_reports_merged_count() {
        // Second chunk is stereo, so the merge cannot concatenate
        let steps = vec![mono(24000), Step::Write { frames: 24000, sample_rate: 24000, channels: 2 }];
        let (pipeline, _) = pipeline(steps, MergeOptions::default());
        let result = pipeline.synthesize(&segments(2), &preset_params()).unwrap();

        assert_eq!(result.segments_generated, 2);
        assert_eq!(result.segments_merged, 1);
        assert!((result.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unmeasurable_output_sums_merged_chunks() {
        let chunk = |frames| AudioChunk { bytes: Vec::new(), sample_rate: 24000, frames, channels: 1 };
        let chunks = vec![chunk(24000), chunk(12000), chunk(48000)];

        let (rate, duration) = measure_or_estimate(b"not audio", AudioFormat::Wav, &chunks, 2);
        assert_eq!(rate, 24000);
        assert!((duration - 1.5).abs() < 1e-9);

        let (_, duration) = measure_or_estimate(b"not audio", AudioFormat::Flac, &chunks, 3);
        assert!((duration - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_measurable_output_ignores_chunk_durations() {
        let bytes = codec::encode(&DecodedAudio { samples: vec![0.1; 16000], sample_rate: 16000, channels: 1 }, AudioFormat::Wav).unwrap();
        let chunks = vec![AudioChunk { bytes: Vec::new(), sample_rate: 24000, frames: 240000, channels: 1 }];

        let (rate, duration) = measure_or_estimate(&bytes, AudioFormat::Wav, &chunks, 1);
        assert_eq!(rate, 16000);
        assert!((duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scratch_root_holds_segment_directories() {
        let root = tempfile::tempdir().unwrap();
        let (pipeline, calls) = pipeline(vec![mono(100), mono(100)], MergeOptions::default());
        let pipeline = pipeline.with_scratch_root(root.path());
        pipeline.synthesize(&segments(2), &preset_params()).unwrap();

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| workdir_of(&c.prefix).parent() == Some(root.path())));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_merge_failure_policy_fail() {
        let steps = vec![mono(24000), Step::Write { frames: 24000, sample_rate: 24000, channels: 2 }];
        let options = MergeOptions { on_failure: MergeFailurePolicy::Fail, on_rate_mismatch: SampleRatePolicy::Ignore };
        let (pipeline, _) = pipeline(steps, options);

        assert!(matches!(pipeline.synthesize(&segments(2), &preset_params()), Err(SynthesisError::Merge(_))));
    }

    #[test]
    fn test_empty_segment_list_is_rejected() {
        let (pipeline, calls) = pipeline(vec![mono(100)], MergeOptions::default());
        assert!(matches!(pipeline.synthesize(&[], &preset_params()), Err(SynthesisError::NoSegments)));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_generate_splits_long_text_and_forwards_mode() {
        let (pipeline, calls) = pipeline(vec![mono(2400)], MergeOptions::default());
        let text = "A reasonably long sentence that keeps going for a while before it ends. ".repeat(10);
        let request = GenerationRequest {
            text: text.clone(),
            params: GenerationParams {
                voice: VoiceSelection::Clone { reference_audio: "reference.wav".into(), reference_text: Some("hello".into()) },
                ..preset_params()
            },
        };

        let result = pipeline.generate(&request).unwrap();
        let expected = pipeline.segmenter().split(&text);

        assert!(expected.len() > 1);
        assert_eq!(result.segments_generated, expected.len());
        assert_eq!(result.segments_merged, expected.len());
        assert!(calls.lock().iter().all(|c| c.mode == Mode::Clone));
        assert!((result.duration_secs - 0.1 * expected.len() as f64).abs() < 1e-6);
    }
}
