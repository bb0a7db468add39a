//! Long-form speech synthesis.
//!
//! Splits text into model-sized segments, drives a speech model once per
//! segment and merges the results into a single audio file.

pub mod command;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod segmenter;
#[cfg(feature = "sherpa")]
mod synthesizer;

pub use command::CommandModel;
pub use error::SynthesisError;
pub use model::{SharedModel, SpeechModel};
pub use pipeline::{AudioSummary, MergedAudio, Pipeline};
pub use segmenter::Segmenter;
#[cfg(feature = "sherpa")]
pub use synthesizer::KokoroSynthesizer;
