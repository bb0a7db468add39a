//! Application configuration and CLI argument parsing.
//!
//! `AppConfig` is also the request validation boundary: everything handed to the
//! pipeline has passed `validate()` and `request()`.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::voices;
use crate::audio::{AudioFormat, MergeFailurePolicy, MergeOptions, SampleRatePolicy};
use crate::tts::command::{DEFAULT_GENERATOR, DEFAULT_MODEL};
use crate::tts::model::{GenerationParams, GenerationRequest, Mode, VoiceSelection};
use crate::tts::segmenter::{MAX_CHARS_PER_GENERATION, MIN_CHARS_PER_SEGMENT, Segmenter};

/// Maximum accepted input text, in characters.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Maximum size of a reference recording for voice cloning.
pub const MAX_REFERENCE_BYTES: u64 = 10 * 1024 * 1024;

/// Accepted reference recording extensions.
pub const REFERENCE_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a", "ogg"];

/// Hardware acceleration provider for ONNX models.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only, requires CUDA toolkit)
    Cuda,
    /// Apple CoreML acceleration (macOS only, uses Neural Engine)
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sherpa_provider())
    }
}

impl Provider {
    /// Convert to sherpa-rs provider string.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// Speech model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// External generator process (mlx-audio compatible command line)
    #[default]
    Command,
    /// In-process Kokoro via sherpa-onnx (requires the `sherpa` feature, preset voices only)
    Kokoro,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Command => write!(f, "command"),
            Backend::Kokoro => write!(f, "kokoro"),
        }
    }
}

/// Long-form text-to-speech configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "longform-tts")]
#[command(author, version, about = "Long-form text-to-speech with automatic segmentation", long_about = None)]
pub struct AppConfig {
    /// Text to synthesize
    #[arg(conflicts_with_all = ["text_file", "batch"])]
    pub text: Option<String>,

    /// Read the text from a file ("-" for stdin)
    #[arg(long, short = 'f', conflicts_with = "batch")]
    pub text_file: Option<PathBuf>,

    /// Synthesize every non-empty line of a file as a separate request
    #[arg(long, short = 'b')]
    pub batch: Option<PathBuf>,

    /// Voice mode: a preset voice or a clone of a reference recording
    #[arg(long, value_enum, default_value = "preset")]
    pub mode: Mode,

    /// Preset voice name (see --list-voices)
    #[arg(long, default_value = voices::DEFAULT_VOICE)]
    pub voice: String,

    /// Reference recording to clone (required with --mode clone)
    #[arg(long)]
    pub ref_audio: Option<PathBuf>,

    /// Transcript of the reference recording
    #[arg(long)]
    pub ref_text: Option<String>,

    /// Speech speed multiplier (0.5-2.0)
    #[arg(long, default_value = "1.0", value_parser = parse_speed)]
    pub speed: f32,

    /// Sampling temperature (0.1-1.0)
    #[arg(long, default_value = "0.7", value_parser = parse_temperature)]
    pub temperature: f32,

    /// Output audio format
    #[arg(long, value_enum, default_value = "wav")]
    pub format: AudioFormat,

    /// Speech model backend
    #[arg(long, value_enum, default_value = "command")]
    pub backend: Backend,

    /// Generator command line for the command backend
    #[arg(long, env = "TTS_GENERATOR", default_value = DEFAULT_GENERATOR)]
    pub generator: String,

    /// Model identifier passed to the generator
    #[arg(long, short = 'm', env = "TTS_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Directory containing Kokoro model files (kokoro backend)
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// TTS threads (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0")]
    pub tts_threads: usize,

    /// Maximum characters per generated segment
    #[arg(long, default_value_t = MAX_CHARS_PER_GENERATION, value_parser = parse_max_chars)]
    pub max_chars: usize,

    /// Segments shorter than this are merged into a neighbour or dropped
    #[arg(long, default_value_t = MIN_CHARS_PER_SEGMENT)]
    pub min_chars: usize,

    /// What to do when segments cannot be merged
    #[arg(long, value_enum, default_value = "fallback")]
    pub on_merge_failure: MergeFailurePolicy,

    /// What to do when segments come back at different sample rates
    #[arg(long, value_enum, default_value = "ignore")]
    pub on_rate_mismatch: SampleRatePolicy,

    /// Output file (single request only)
    #[arg(long, short = 'o', conflicts_with = "batch")]
    pub output: Option<PathBuf>,

    /// Directory for generated files named output-<uuid>.<ext>
    #[arg(long, default_value = "outputs")]
    pub output_dir: PathBuf,

    /// Print a JSON summary per request on stdout
    #[arg(long)]
    pub json: bool,

    /// List all available preset voices and exit
    #[arg(long)]
    pub list_voices: bool,

    /// Show detailed information about a specific voice and exit
    #[arg(long)]
    pub voice_info: Option<String>,

    /// Print the text segments and exit without generating audio
    #[arg(long)]
    pub split_only: bool,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();

        // Handle voice listing commands
        if config.list_voices {
            voices::print_voices();
            std::process::exit(0);
        }

        if let Some(ref voice_name) = config.voice_info {
            match voices::print_voice_info(voice_name) {
                Ok(_) => std::process::exit(0),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        config.normalize_thread_counts();
        config
    }

    /// Pick a TTS thread count when none was given.
    ///
    /// With CUDA a single thread is used since the GPU handles parallelism; on CPU
    /// a third of the cores leaves headroom for concurrent batch requests.
    fn normalize_thread_counts(&mut self) {
        if self.tts_threads == 0 {
            self.tts_threads = if self.effective_provider() == Provider::Cuda { 1 } else { (num_cpus::get() / 3).max(1) };
        }
    }

    /// Get the effective acceleration provider.
    pub fn effective_provider(&self) -> Provider {
        self.provider.unwrap_or_else(detect_provider)
    }

    /// Directory of the Kokoro multi-lang v1.0 model.
    pub fn kokoro_dir(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0")
    }

    /// Files the kokoro backend cannot start without.
    pub fn kokoro_required_files(&self) -> [PathBuf; 3] {
        let dir = self.kokoro_dir();
        [dir.join("model.onnx"), dir.join("voices.bin"), dir.join("tokens.txt")]
    }

    /// Voice selection described by the flags.
    pub fn voice_selection(&self) -> VoiceSelection {
        match self.mode {
            Mode::Preset => VoiceSelection::Preset { voice: self.voice.trim().to_string() },
            Mode::Clone => VoiceSelection::Clone {
                reference_audio: self.ref_audio.clone().unwrap_or_default(),
                reference_text: self.ref_text.as_deref().map(str::trim).filter(|t| !t.is_empty()).map(str::to_string),
            },
        }
    }

    /// Generation parameters shared by every request.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams { voice: self.voice_selection(), speed: self.speed, temperature: self.temperature, format: self.format }
    }

    /// Build a validated request for `text`.
    ///
    /// # Errors
    /// Returns an error if the text is empty or too long.
    pub fn request(&self, text: &str) -> Result<GenerationRequest> {
        Ok(GenerationRequest { text: validate_text(text)?, params: self.generation_params() })
    }

    pub fn segmenter(&self) -> Segmenter {
        Segmenter::new(self.max_chars, self.min_chars)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions { on_failure: self.on_merge_failure, on_rate_mismatch: self.on_rate_mismatch }
    }

    /// Collect the input texts: one per batch line, or the single text/file/stdin input.
    ///
    /// # Errors
    /// Returns an error if no input was given or an input file cannot be read.
    pub fn input_texts(&self) -> Result<Vec<String>> {
        if let Some(ref batch) = self.batch {
            let contents = std::fs::read_to_string(batch).with_context(|| format!("Failed to read batch file {}", batch.display()))?;
            let lines: Vec<String> = contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect();
            if lines.is_empty() {
                bail!("Batch file {} contains no text", batch.display());
            }
            return Ok(lines);
        }

        if let Some(ref path) = self.text_file {
            return Ok(vec![read_text_file(path)?]);
        }

        match self.text {
            Some(ref text) => Ok(vec![text.clone()]),
            None => bail!("No input text. Pass TEXT, --text-file or --batch"),
        }
    }

    /// Where to write the audio for one request.
    pub fn output_path(&self, format: AudioFormat) -> PathBuf {
        match self.output {
            Some(ref path) => path.clone(),
            None => self.output_dir.join(format!("output-{}.{}", Uuid::new_v4(), format.extension())),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=2.0).contains(&self.speed) {
            bail!("Speed must be between 0.5 and 2.0, got {}", self.speed);
        }

        if !(0.1..=1.0).contains(&self.temperature) {
            bail!("Temperature must be between 0.1 and 1.0, got {}", self.temperature);
        }

        if self.max_chars == 0 {
            bail!("--max-chars must be at least 1");
        }

        if self.min_chars > self.max_chars {
            bail!("--min-chars ({}) must not exceed --max-chars ({})", self.min_chars, self.max_chars);
        }

        match self.mode {
            Mode::Preset => {
                if self.voice.trim().is_empty() {
                    bail!("Voice is required for preset mode");
                }
                if voices::get_voice(self.voice.trim()).is_none() {
                    if self.backend == Backend::Kokoro {
                        bail!("Voice '{}' not found. Run with --list-voices to see available voices", self.voice);
                    }
                    warn!("Voice '{}' is not in the Kokoro catalog, passing it to the generator as is", self.voice);
                }
            }
            Mode::Clone => {
                let path = self.ref_audio.as_deref().context("Reference audio (--ref-audio) is required for clone mode")?;
                validate_reference_audio(path)?;
            }
        }

        if self.backend == Backend::Kokoro {
            if self.mode == Mode::Clone {
                bail!("The kokoro backend only supports preset voices");
            }
            if !self.model_dir.exists() {
                bail!("Model directory does not exist: {}", self.model_dir.display());
            }
            for path in &self.kokoro_required_files() {
                if !path.exists() {
                    bail!("Required model file not found: {}", path.display());
                }
            }
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Backend: {}", self.backend);
        match self.backend {
            Backend::Command => {
                info!("  Generator: {}", self.generator);
                info!("  Model: {}", self.model);
            }
            Backend::Kokoro => {
                info!("  Model directory: {}", self.model_dir.display());
                info!("  Provider: {} ({} threads)", self.effective_provider(), self.tts_threads);
            }
        }
        info!("  Mode: {}", self.mode);
        match self.mode {
            Mode::Preset => info!("  Voice: {}", self.voice),
            Mode::Clone => {
                if let Some(ref path) = self.ref_audio {
                    info!("  Reference audio: {}", path.display());
                }
                if let Some(ref text) = self.ref_text {
                    info!("  Reference text: {}...", text.chars().take(50).collect::<String>());
                }
            }
        }
        info!("  Speed: {}, temperature: {}", self.speed, self.temperature);
        info!("  Format: {}", self.format);
        info!("  Segments: {}-{} chars", self.min_chars, self.max_chars);
        info!("  Merge: on failure {:?}, on rate mismatch {:?}", self.on_merge_failure, self.on_rate_mismatch);
    }
}

/// Trim and bound-check input text.
///
/// # Errors
/// Returns an error if the text is empty after trimming or longer than `MAX_TEXT_CHARS`.
pub fn validate_text(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        bail!("Text input cannot be empty");
    }

    let len = text.chars().count();
    if len > MAX_TEXT_CHARS {
        bail!("Text input exceeds maximum length of {} characters ({} given)", MAX_TEXT_CHARS, len);
    }

    Ok(text.to_string())
}

/// Check a reference recording exists, has an accepted extension and is small enough.
///
/// # Errors
/// Returns an error naming the failed check.
pub fn validate_reference_audio(path: &Path) -> Result<()> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).unwrap_or_default();
    if !REFERENCE_EXTENSIONS.contains(&extension.as_str()) {
        bail!("Invalid reference audio format '{}'. Accepted: {}", path.display(), REFERENCE_EXTENSIONS.join(", "));
    }

    let metadata = std::fs::metadata(path).with_context(|| format!("Reference audio not found: {}", path.display()))?;
    if !metadata.is_file() {
        bail!("Reference audio is not a file: {}", path.display());
    }
    if metadata.len() > MAX_REFERENCE_BYTES {
        bail!("Reference audio exceeds {} MB: {}", MAX_REFERENCE_BYTES / (1024 * 1024), path.display());
    }

    Ok(())
}

/// Read input text from a file, or stdin for "-".
fn read_text_file(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("Failed to read text from stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read text file {}", path.display()))
}

/// Get the default model directory (~/.longform-tts/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".longform-tts").join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        info!("Detected macOS, using CoreML provider");
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() {
            info!("Detected NVIDIA GPU, using CUDA provider");
            Provider::Cuda
        } else {
            info!("No GPU detected, using CPU provider");
            Provider::Cpu
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        info!("Using CPU provider");
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    // Device files, then the Jetson release marker
    let nvidia_paths = ["/dev/nvidia0", "/dev/nvidiactl", "/dev/nvidia-uvm", "/dev/nvhost-ctrl", "/dev/nvhost-ctrl-gpu", "/etc/nv_tegra_release"];

    nvidia_paths.iter().any(|path| Path::new(path).exists())
}

/// Parse and validate speed (0.5-2.0).
fn parse_speed(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    if (0.5..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("speed must be between 0.5 and 2.0, got {}", value))
    }
}

/// Parse and validate temperature (0.1-1.0).
fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    if (0.1..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("temperature must be between 0.1 and 1.0, got {}", value))
    }
}

fn parse_max_chars(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("max chars must be at least 1".to_string()),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("'{}' is not a valid count", s)),
    }
}
