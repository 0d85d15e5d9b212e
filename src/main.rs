//! Command-line client for the Hebrew TTS endpoint.
//!
//! ```bash
//! export RUNPOD_API_URL=https://api.runpod.ai/v2/<endpoint>/run
//! export RUNPOD_API_KEY=...
//!
//! hebtts generate --text "שלום עולם" --speaker geek -o hello.wav
//! hebtts batch chapters/ --output-dir audio/
//! hebtts health
//! ```
//!
//! Ctrl+C stops the running work and cancels the remote jobs.

mod args;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use walkdir::WalkDir;

use args::{Cli, Command};
use hebtts::config::{AppConfig, OrchestrationConfig};
use hebtts::events::{AppEvent, EventBus};
use hebtts::models::{FileStatus, VoiceParameters};
use hebtts::services::runpod::{RunPodClient, SynthesisApi};
use hebtts::services::tts::{
    BatchFileOrchestrator, FileSource, GenerationOrchestrator, GenerationOutcome,
};
use hebtts::utils::audio::default_file_name;
use hebtts::utils::logger::init_logger_with;

// Сколько ждём фоновую отмену удалённой задачи перед выходом
const CANCEL_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger_with(Some(cli.verbose));

    let mut config = AppConfig::from_env();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint_url = Some(endpoint);
    }
    if let Some(api_key) = cli.api_key {
        config.api_key = Some(api_key);
    }
    config.credentials()?;

    let api: Arc<dyn SynthesisApi> = Arc::new(RunPodClient::new(config)?);
    let orchestration = OrchestrationConfig::default();
    let events = EventBus::new();

    match cli.command {
        Command::Generate {
            text,
            output,
            voice,
        } => {
            let orchestrator =
                GenerationOrchestrator::new(api, orchestration.generation, events);
            run_generate(orchestrator, text, output, voice.into()).await
        }
        Command::Batch {
            paths,
            output_dir,
            voice,
        } => {
            let orchestrator = BatchFileOrchestrator::new(api, orchestration.batch, events);
            run_batch(orchestrator, &paths, &output_dir, voice.into()).await
        }
        Command::Health => {
            let report = api.health().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn run_generate(
    orchestrator: GenerationOrchestrator,
    text: String,
    output: Option<PathBuf>,
    voice: VoiceParameters,
) -> Result<()> {
    let stopper = orchestrator.clone();
    let ctrl_c_handler = tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            warn!("Received Ctrl+C signal, stopping generation...");
            stopper.stop();
        }
    });

    let outcome = orchestrator.generate(text, voice).await;
    ctrl_c_handler.abort();

    match outcome? {
        GenerationOutcome::Completed(audio) => {
            let path = output.unwrap_or_else(|| PathBuf::from(default_file_name()));
            let path = audio
                .save_to(&path)
                .await
                .with_context(|| format!("Failed to save audio to {}", path.display()))?;
            match audio.duration_secs() {
                Ok(duration) => println!("{} ({:.1}s)", path.display(), duration),
                Err(_) => println!("{}", path.display()),
            }
            Ok(())
        }
        GenerationOutcome::Failed(message) => bail!("Generation failed: {}", message),
        GenerationOutcome::Cancelled => {
            tokio::time::sleep(CANCEL_GRACE).await;
            warn!("Generation cancelled");
            Ok(())
        }
    }
}

async fn run_batch(
    orchestrator: BatchFileOrchestrator,
    paths: &[PathBuf],
    output_dir: &Path,
    voice: VoiceParameters,
) -> Result<()> {
    let sources = collect_text_files(paths);
    if sources.is_empty() {
        bail!("No .txt files found");
    }

    let ids = orchestrator
        .add_files(sources.into_iter().map(FileSource::Path))
        .await;
    for item in orchestrator.files() {
        if let Some(error) = &item.error {
            warn!("Skipping {}: {}", item.name, error);
        }
    }

    let progress = spawn_progress_printer(&orchestrator);
    let stopper = orchestrator.clone();
    let ctrl_c_handler = tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            warn!("Received Ctrl+C signal, stopping all files...");
            stopper.stop_all();
        }
    });

    let summary = orchestrator.process_files(&ids, &voice).await;
    ctrl_c_handler.abort();
    progress.abort();
    let summary = summary?;

    let saved = orchestrator
        .save_all_successful(output_dir)
        .await
        .with_context(|| format!("Failed to save audio to {}", output_dir.display()))?;
    for path in &saved {
        println!("{}", path.display());
    }

    let counts = orchestrator.counts();
    info!(
        "Done: {} succeeded, {} failed, {} stopped, {} invalid",
        summary.succeeded,
        summary.failed,
        summary.abandoned,
        counts.error.saturating_sub(summary.failed)
    );
    if summary.abandoned > 0 {
        tokio::time::sleep(CANCEL_GRACE).await;
    }
    if summary.failed > 0 {
        bail!("{} file(s) failed", summary.failed);
    }
    Ok(())
}

fn spawn_progress_printer(orchestrator: &BatchFileOrchestrator) -> tokio::task::JoinHandle<()> {
    let mut events = BroadcastStream::new(orchestrator.events().subscribe());
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(AppEvent::FileStatusChanged { id, status, error }) => {
                    let name = orchestrator
                        .file(&id)
                        .map(|item| item.name)
                        .unwrap_or_else(|| id.to_string());
                    match (status, error) {
                        (FileStatus::Error, Some(error)) => eprintln!("✗ {}: {}", name, error),
                        (FileStatus::Success, _) => eprintln!("✓ {}", name),
                        (status, _) => info!("{}: {}", name, status),
                    }
                }
                Ok(AppEvent::BatchCompleted { index, total, .. }) => {
                    info!("Batch {}/{} finished", index + 1, total);
                }
                Ok(_) => {}
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Progress output skipped {} events", skipped);
                }
            }
        }
    })
}

/// Expand directories into the `.txt` files they contain, sorted by path.
fn collect_text_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = paths
        .iter()
        .flat_map(|path| {
            WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(move |entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("Cannot read {}: {}", path.display(), e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| {
                    path.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
                })
        })
        .collect();
    files.sort();
    files.dedup();
    files
}
