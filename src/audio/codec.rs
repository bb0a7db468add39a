//! In-memory audio decoding and encoding.
//!
//! WAV goes through hound in both directions. FLAC, MP3 and Ogg Vorbis are decoded with
//! symphonia. FLAC is encoded with flacenc; MP3 and Ogg Vorbis are encoded by ffmpeg.

use std::io::Cursor;
use std::process::{Command, Stdio};

use flacenc::component::BitRepr;
use flacenc::error::Verify;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Output container/codec requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Flac,
    Mp3,
    Ogg,
}

impl AudioFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Errors raised while decoding or encoding audio.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("WAV codec error: {0}")]
    Wav(#[from] hound::Error),

    #[error("decode error: {0}")]
    Decode(#[from] SymphoniaError),

    #[error("no audio track found")]
    NoTrack,

    #[error("unsupported WAV layout: {0} bits per sample")]
    UnsupportedBitDepth(u16),

    #[error("{format} encoder failed: {message}")]
    Encoder { format: AudioFormat, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio has zero channels or zero sample rate")]
    Empty,
}

/// External program used for MP3 and Ogg Vorbis encoding.
pub const FFMPEG: &str = "ffmpeg";

/// Decoded PCM audio, interleaved when multi-channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>, // Interleaved samples in [-1.0, 1.0]
    pub sample_rate: u32,  // Samples per second per channel
    pub channels: u16,     // Channel count (1 = mono)
}

impl DecodedAudio {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Decode an encoded audio buffer.
///
/// # Arguments
/// * `bytes` - Encoded audio file contents
/// * `format` - Container the bytes are expected to be in (used as a probe hint)
///
/// # Errors
/// Returns an error if the bytes cannot be parsed or contain no audio track.
pub fn decode(bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio, CodecError> {
    let audio = match format {
        AudioFormat::Wav => decode_wav(bytes)?,
        _ => decode_compressed(bytes, format)?,
    };

    if audio.channels == 0 || audio.sample_rate == 0 {
        return Err(CodecError::Empty);
    }

    Ok(audio)
}

/// Encode PCM audio into the requested format.
///
/// Samples are quantized to 16 bits for WAV and FLAC.
///
/// # Errors
/// Returns an error if the audio is empty or the encoder fails. MP3 and Ogg Vorbis
/// also fail when ffmpeg is missing or lacks the encoder.
pub fn encode(audio: &DecodedAudio, format: AudioFormat) -> Result<Vec<u8>, CodecError> {
    if audio.channels == 0 || audio.sample_rate == 0 {
        return Err(CodecError::Empty);
    }

    match format {
        AudioFormat::Wav => encode_wav(audio),
        AudioFormat::Flac => encode_flac(audio),
        AudioFormat::Mp3 => encode_with_ffmpeg(audio, format, &["-c:a", "libmp3lame", "-id3v2_version", "0"]),
        AudioFormat::Ogg => encode_with_ffmpeg(audio, format, &["-c:a", "libvorbis"]),
    }
}

fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, CodecError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(CodecError::UnsupportedBitDepth(spec.bits_per_sample));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader.samples::<i32>().map(|s| s.map(|v| v as f32 / scale)).collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(DecodedAudio { samples, sample_rate: spec.sample_rate, channels: spec.channels })
}

fn decode_compressed(bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio, CodecError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    // Gapless mode trims encoder delay and padding so durations match the source
    let format_options = FormatOptions { enable_gapless: true, ..Default::default() };
    let probed = symphonia::default::get_probe().format(&hint, source, &format_options, &MetadataOptions::default())?;
    let mut reader = probed.format;

    let track = reader.tracks().iter().find(|t| t.codec_params.codec != CODEC_TYPE_NULL).ok_or(CodecError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
    let mut samples = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frames are skipped, matching the decoder's own recovery model
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    Ok(DecodedAudio { samples, sample_rate, channels })
}

fn encode_wav(audio: &DecodedAudio) -> Result<Vec<u8>, CodecError> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + audio.samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in &audio.samples {
            writer.write_sample(quantize(sample))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

fn flac_error(e: impl std::fmt::Debug) -> CodecError {
    CodecError::Encoder { format: AudioFormat::Flac, message: format!("{:?}", e) }
}

fn encode_flac(audio: &DecodedAudio) -> Result<Vec<u8>, CodecError> {
    let samples: Vec<i32> = audio.samples.iter().map(|&s| quantize(s) as i32).collect();

    let config = flacenc::config::Encoder::default().into_verified().map_err(|(_, e)| flac_error(e))?;
    let source = flacenc::source::MemSource::from_samples(&samples, audio.channels as usize, 16, audio.sample_rate as usize);
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size).map_err(flac_error)?;

    let mut sink = flacenc::bitsink::ByteSink::new();
    stream.write(&mut sink).map_err(flac_error)?;

    Ok(sink.as_slice().to_vec())
}

/// Hand a WAV rendition to ffmpeg and read back the encoded file.
fn encode_with_ffmpeg(audio: &DecodedAudio, format: AudioFormat, codec_args: &[&str]) -> Result<Vec<u8>, CodecError> {
    let workdir = tempfile::Builder::new().prefix("longform-tts-encode-").tempdir()?;
    let input = workdir.path().join("merged.wav");
    let output = workdir.path().join(format!("merged.{}", format.extension()));
    std::fs::write(&input, encode_wav(audio)?)?;

    let result = Command::new(FFMPEG)
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(&input)
        .args(codec_args)
        .arg(&output)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CodecError::Encoder { format, message: format!("failed to start {}: {}", FFMPEG, e) })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(CodecError::Encoder { format, message: format!("{} exited with {}: {}", FFMPEG, result.status, stderr.trim()) });
    }

    Ok(std::fs::read(&output)?)
}

/// Whether ffmpeg is installed with the named encoder.
#[cfg(test)]
pub(crate) fn ffmpeg_has_encoder(name: &str) -> bool {
    Command::new(FFMPEG)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).contains(name))
        .unwrap_or(false)
}
