//! In-process speech model using Kokoro via sherpa-rs.
//!
//! Only preset voices are supported. Samples are encoded to the requested format.

use anyhow::{Context, Result, anyhow, bail};
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{CommonTtsConfig, KokoroTts, KokoroTtsConfig};
use tracing::{debug, info};

use super::model::{ModelJob, SpeechModel, VoiceSelection};
use crate::audio::codec::{self, DecodedAudio};
use crate::config::{AppConfig, voices};

/// Kokoro output sample rate.
const KOKORO_SAMPLE_RATE: u32 = 24000;

/// Text-to-speech synthesizer using Kokoro models.
pub struct KokoroSynthesizer {
    tts: KokoroTts,   // Kokoro TTS engine
    sample_rate: u32, // Output sample rate (24kHz for Kokoro)
}

impl KokoroSynthesizer {
    /// Create a new Kokoro synthesizer.
    ///
    /// The lexicon and language are chosen from the configured preset voice, so every
    /// request served by this instance should use a voice of the same language.
    ///
    /// # Arguments
    /// * `config` - Application configuration
    ///
    /// # Errors
    /// Returns an error if the configured voice is not in the catalog.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let provider = config.effective_provider();
        let voice = voices::get_voice(config.voice.trim()).with_context(|| format!("Voice '{}' not found", config.voice))?;

        info!("Initializing Kokoro TTS synthesizer with {} provider", provider);
        info!("TTS voice: {} (speaker ID: {}, {})", voice.name, voice.speaker_id, voice.language.label());

        let dir = config.kokoro_dir();
        let lexicon = voice.language.lexicons().iter().map(|file| dir.join(file).to_string_lossy().to_string()).collect::<Vec<_>>().join(",");

        let tts_config = KokoroTtsConfig {
            model: dir.join("model.onnx").to_string_lossy().to_string(),
            voices: dir.join("voices.bin").to_string_lossy().to_string(),
            tokens: dir.join("tokens.txt").to_string_lossy().to_string(),
            data_dir: dir.join("espeak-ng-data").to_string_lossy().to_string(),
            dict_dir: dir.join("dict").to_string_lossy().to_string(),
            lexicon,
            lang: voice.language.kokoro_lang().to_string(),
            length_scale: 1.0, // Speed is applied per request
            onnx_config: OnnxConfig {
                provider: provider.as_sherpa_provider().to_string(),
                num_threads: config.tts_threads.try_into().unwrap_or(2),
                debug: config.verbose,
            },
            common_config: CommonTtsConfig { max_num_sentences: 1, ..Default::default() }, // Kokoro only supports 1
        };

        let tts = KokoroTts::new(tts_config);
        info!("TTS sample rate: {} Hz", KOKORO_SAMPLE_RATE);

        Ok(Self { tts, sample_rate: KOKORO_SAMPLE_RATE })
    }
}

impl SpeechModel for KokoroSynthesizer {
    fn name(&self) -> &str {
        "kokoro"
    }

    fn generate(&mut self, job: &ModelJob<'_>) -> Result<()> {
        let VoiceSelection::Preset { voice } = &job.params.voice else {
            bail!("Kokoro does not support voice cloning");
        };

        let speaker_id = voices::get_voice(voice).map(|v| v.speaker_id).with_context(|| format!("Voice '{}' not found", voice))?;

        debug!("Synthesizing segment: \"{}\"", job.text);
        let audio = self.tts.create(job.text, speaker_id, job.params.speed).map_err(|e| anyhow!("TTS generation failed: {}", e))?;

        let bytes = codec::encode(&DecodedAudio { samples: audio.samples, sample_rate: self.sample_rate, channels: 1 }, job.params.format)?;
        let path = self.output_file(job.output_prefix, job.params.format);
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }
}
