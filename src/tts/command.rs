//! Speech model backed by an external generator process.
//!
//! Each segment runs one generator invocation which writes `<prefix>_000.<ext>`.

use std::ffi::OsString;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::debug;

use super::model::{ModelJob, SpeechModel, VoiceSelection};

/// Default generator command line.
pub const DEFAULT_GENERATOR: &str = "python3 -m mlx_audio.tts.generate";

/// Default model identifier passed to the generator.
pub const DEFAULT_MODEL: &str = "mlx-community/Kokoro-82M-bf16";

/// Runs an external text-to-speech generator once per segment.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,        // Executable to run
    base_args: Vec<String>, // Leading arguments from the command line
    model: String,          // Model identifier forwarded with --model
}

impl CommandModel {
    /// Create a generator backend.
    ///
    /// # Arguments
    /// * `command_line` - Program and leading arguments, whitespace separated
    /// * `model` - Model identifier
    ///
    /// # Errors
    /// Returns an error if the command line is empty.
    pub fn new(command_line: &str, model: impl Into<String>) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().context("generator command is empty")?;

        Ok(Self { program, base_args: parts.collect(), model: model.into() })
    }

    /// Arguments describing one job, appended after the base arguments.
    pub fn job_args(&self, job: &ModelJob<'_>) -> Vec<OsString> {
        let params = job.params;
        let mut args: Vec<OsString> = vec![
            "--model".into(),
            self.model.clone().into(),
            "--text".into(),
            job.text.into(),
            "--speed".into(),
            params.speed.to_string().into(),
            "--temperature".into(),
            params.temperature.to_string().into(),
            "--file_prefix".into(),
            job.output_prefix.as_os_str().to_owned(),
            "--audio_format".into(),
            params.format.extension().into(),
        ];

        match &params.voice {
            VoiceSelection::Preset { voice } => {
                args.push("--voice".into());
                args.push(voice.into());
            }
            VoiceSelection::Clone { reference_audio, reference_text } => {
                args.push("--ref_audio".into());
                args.push(reference_audio.as_os_str().to_owned());
                if let Some(text) = reference_text {
                    args.push("--ref_text".into());
                    args.push(text.into());
                }
            }
        }

        args
    }
}

impl SpeechModel for CommandModel {
    fn name(&self) -> &str {
        &self.program
    }

    fn generate(&mut self, job: &ModelJob<'_>) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args).args(self.job_args(job));
        cmd.stdin(Stdio::null());

        debug!("Running generator: {:?}", cmd);
        let output = cmd.output().with_context(|| format!("failed to start generator '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("generator exited with {}: {}", output.status, stderr.trim());
        }

        Ok(())
    }
}
