//! Errors surfaced by the synthesis pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::audio::codec::CodecError;
use crate::audio::merge::MergeError;

/// A request-level synthesis failure. No partial audio accompanies any of these.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("no segments to synthesize")]
    NoSegments,

    #[error("audio generation failed for segment {segment}/{total}: {source}")]
    Model {
        segment: usize,
        total: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("audio generation failed for segment {segment}/{total}: no output file created at {}", path.display())]
    MissingOutput { segment: usize, total: usize, path: PathBuf },

    #[error("could not decode audio for segment {segment}: {source}")]
    Decode {
        segment: usize,
        #[source]
        source: CodecError,
    },

    #[error("merging segments failed: {0}")]
    Merge(#[from] MergeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
