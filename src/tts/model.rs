//! The boundary between the pipeline and the underlying speech model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

/// Voice selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Built-in named voice
    #[default]
    Preset,
    /// Voice cloned from a reference recording
    Clone,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Preset => write!(f, "preset"),
            Mode::Clone => write!(f, "clone"),
        }
    }
}

/// Which voice to speak with. Exactly one source is ever populated.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceSelection {
    Preset { voice: String },
    Clone { reference_audio: PathBuf, reference_text: Option<String> },
}

impl VoiceSelection {
    pub fn mode(&self) -> Mode {
        match self {
            VoiceSelection::Preset { .. } => Mode::Preset,
            VoiceSelection::Clone { .. } => Mode::Clone,
        }
    }
}

/// Generation parameters shared by every segment of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub voice: VoiceSelection,
    pub speed: f32,         // 0.5 - 2.0
    pub temperature: f32,   // 0.1 - 1.0
    pub format: AudioFormat,
}

/// One validated synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub text: String,
    pub params: GenerationParams,
}

/// A single model invocation.
#[derive(Debug, Clone, Copy)]
pub struct ModelJob<'a> {
    pub text: &'a str,
    pub params: &'a GenerationParams,
    pub output_prefix: &'a Path, // Where the model should write its file (without suffix)
}

/// A text-to-speech model that writes one encoded audio file per call.
///
/// Implementations are not expected to be re-entrant; callers serialize access
/// through [`SharedModel`].
pub trait SpeechModel: Send {
    /// Short backend name for logging.
    fn name(&self) -> &str;

    /// Synthesize `job.text` and write the result to `self.output_file(job.output_prefix, ..)`.
    ///
    /// # Errors
    /// Returns an error if the model could not run. Succeeding without writing the file
    /// is also treated as a failure by the pipeline.
    fn generate(&mut self, job: &ModelJob<'_>) -> Result<()>;

    /// Path of the file `generate` writes for `prefix`.
    ///
    /// The default follows the generator convention of a `_000` suffix per output file.
    fn output_file(&self, prefix: &Path, format: AudioFormat) -> PathBuf {
        let mut name = prefix.as_os_str().to_owned();
        name.push(format!("_000.{}", format.extension()));
        PathBuf::from(name)
    }
}

/// A single model instance shared across requests.
pub type SharedModel = Arc<Mutex<Box<dyn SpeechModel>>>;

/// Wrap a model for shared, serialized use.
pub fn shared(model: Box<dyn SpeechModel>) -> SharedModel {
    Arc::new(Mutex::new(model))
}
