//! Longform TTS - long-form text-to-speech on top of short-input speech models.
//!
//! Text is split into segments the model can handle, each segment is synthesized
//! in order, and the results are merged into a single audio file.

mod audio;
mod config;
mod tts;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use config::{AppConfig, Backend};
use tts::model::{self, GenerationRequest, SharedModel};
use tts::{AudioSummary, CommandModel, Pipeline};

/// JSON summary printed per request with `--json`.
#[derive(Serialize)]
struct Report<'a> {
    output: &'a Path,
    processing_time: f64,
    #[serde(flatten)]
    audio: AudioSummary,
}

/// Segment listing printed by `--split-only --json`.
#[derive(Serialize)]
struct SegmentReport<'a> {
    index: usize,
    chars: usize,
    text: &'a str,
}

/// Create the configured speech model backend.
///
/// # Errors
/// Returns an error if the backend cannot be initialized.
fn build_model(config: &AppConfig) -> Result<SharedModel> {
    match config.backend {
        Backend::Command => {
            let model = CommandModel::new(&config.generator, config.model.clone())?;
            Ok(model::shared(Box::new(model)))
        }
        #[cfg(feature = "sherpa")]
        Backend::Kokoro => {
            let model = tts::KokoroSynthesizer::new(config)?;
            Ok(model::shared(Box::new(model)))
        }
        #[cfg(not(feature = "sherpa"))]
        Backend::Kokoro => bail!("The kokoro backend requires building with `--features sherpa`"),
    }
}

/// Write the merged audio, creating parent directories as needed.
fn save_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Round to two decimals for reporting.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Print the segments of every request without generating audio.
fn print_segments(config: &AppConfig, requests: &[GenerationRequest]) -> Result<()> {
    let segmenter = config.segmenter();

    for request in requests {
        let segments = segmenter.split(&request.text);

        if config.json {
            let report: Vec<SegmentReport> =
                segments.iter().enumerate().map(|(i, text)| SegmentReport { index: i + 1, chars: text.chars().count(), text }).collect();
            println!("{}", serde_json::to_string(&report)?);
        } else {
            for (i, text) in segments.iter().enumerate() {
                println!("[{}/{}] ({} chars) {}", i + 1, segments.len(), text.chars().count(), text);
            }
        }
    }

    Ok(())
}

/// Synthesize one request on the blocking pool and save the result.
///
/// # Arguments
/// * `pipeline` - Shared pipeline
/// * `request` - Validated request
/// * `output` - Destination file
/// * `json` - Print a JSON summary on stdout
async fn run_request(pipeline: Pipeline, request: GenerationRequest, output: PathBuf, json: bool) -> Result<()> {
    let start = Instant::now();
    let chars = request.text.chars().count();
    info!("📝 Synthesizing {} chars", chars);

    let audio = tokio::task::spawn_blocking(move || pipeline.generate(&request)).await.context("Synthesis task failed")??;

    if audio.segments_merged < audio.segments_generated {
        warn!("⚠️  Only {} of {} segments made it into {}", audio.segments_merged, audio.segments_generated, output.display());
    }

    save_output(&output, &audio.bytes)?;
    let processing_time = round2(start.elapsed().as_secs_f64());

    info!("💾 Saved {} ({:.2}s of audio, {} Hz) in {:.2}s", output.display(), audio.duration_secs, audio.sample_rate, processing_time);

    if json {
        println!("{}", serde_json::to_string(&Report { output: &output, processing_time, audio: audio.summary() })?);
    }

    Ok(())
}

/// Run every request concurrently; segments within a request stay sequential.
async fn run_all(config: &AppConfig, pipeline: Pipeline, requests: Vec<GenerationRequest>) -> Result<()> {
    let total = requests.len();
    let mut tasks = JoinSet::new();

    for request in requests {
        let output = config.output_path(request.params.format);
        tasks.spawn(run_request(pipeline.clone(), request, output, config.json));
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("❌ Generation failed: {:#}", e);
                failed += 1;
            }
            Err(e) => {
                error!("❌ Generation task aborted: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} request(s) failed", failed, total);
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .context("Invalid log filter")?;

    // Logs go to stderr so stdout stays clean for --json and --split-only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🗣️  Longform TTS v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration and input
    let requests = config
        .validate()
        .and_then(|_| config.input_texts())
        .and_then(|texts| texts.iter().map(|text| config.request(text)).collect::<Result<Vec<_>>>());

    let requests = match requests {
        Ok(requests) => requests,
        Err(e) => {
            error!("❌ Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if config.split_only {
        return print_segments(&config, &requests);
    }

    config.log_config();

    let model = build_model(&config)?;
    info!("Using {} backend", model.lock().name());

    // Every segment's scratch dir lives under this root, so shutdown can remove them all
    let scratch = tempfile::Builder::new().prefix("longform-tts-").tempdir().context("Failed to create scratch directory")?;
    let pipeline = Pipeline::new(model, config.segmenter(), config.merge_options()).with_scratch_root(scratch.path());

    tokio::select! {
        result = run_all(&config, pipeline, requests) => {
            result?;
            info!("✅ Done");
        }
        _ = wait_for_shutdown() => {
            // Blocking segment work cannot be cancelled, and exit skips destructors
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
            std::process::exit(130);
        }
    }

    Ok(())
}
