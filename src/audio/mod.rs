//! Audio handling for generated speech.
//!
//! Decoding and encoding of model output, merging of per-segment chunks,
//! and sample-rate conversion via rubato.

pub mod codec;
pub mod merge;
pub mod resampler;

pub use codec::AudioFormat;
pub use merge::{AudioChunk, MergeFailurePolicy, MergeOptions, SampleRatePolicy};
