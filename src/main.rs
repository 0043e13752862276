//! Seizure Guard - Main Entry Point
//!
//! Runs the pipeline headless. With `SEIZURE_GUARD_REPLAY` set, a benchmark
//! blob is streamed through the assembler in place of a live sensor.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use seizure_guard_core::constants::{
    get_replay_interval, get_replay_path, get_replay_shuffle, APP_NAME, APP_VERSION,
};
use seizure_guard_core::logic::config::PipelineConfig;
use seizure_guard_core::logic::dataset::ReplaySource;
use seizure_guard_core::logic::events::{LogSurface, PipelineEvent};
use seizure_guard_core::logic::model::{ModelManager, OnnxBackend};
use seizure_guard_core::logic::pipeline::{Orchestrator, PipelineState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    let config = PipelineConfig::load().context("loading configuration")?;
    log::info!(
        "Artifacts: serving={} output={}",
        config.artifacts.serving_model.display(),
        config.artifacts.output_dir.display()
    );

    let backend = Arc::new(OnnxBackend::from_artifacts(&config.artifacts));
    let manager = Arc::new(ModelManager::new(
        backend,
        config.artifacts.clone(),
        config.on_rejected,
    ));
    let pipeline = Orchestrator::new(config, manager, Arc::new(LogSurface));

    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PipelineEvent::TrainingFinished(report) => log::info!(
                    "Cycle {} finished in {} ms: f1 {:.3} -> {:.3} ({}), serving generation {}",
                    report.cycle_id,
                    report.duration_ms,
                    report.current.f1,
                    report.candidate.f1,
                    if report.promoted { "promoted" } else { "rejected" },
                    report.generation
                ),
                PipelineEvent::TrainingAborted { cycle_id, reason } => {
                    log::error!("Cycle {} aborted: {}", cycle_id, reason)
                }
                other => log::debug!("{:?}", other),
            }
        }
    });

    tokio::select! {
        result = pipeline.start() => result.context("starting pipeline")?,
        _ = tokio::signal::ctrl_c() => {
            pipeline.stop();
            return Ok(());
        }
    }

    if let Some(path) = get_replay_path() {
        let mut source = ReplaySource::load(&path)
            .with_context(|| format!("loading replay blob {}", path.display()))?;
        if get_replay_shuffle() {
            source = source.shuffled(&mut rand::thread_rng());
        }
        let replay = pipeline.clone();
        let interval = get_replay_interval();
        log::info!("Replaying {} samples from {}", source.len(), path.display());
        std::thread::spawn(move || replay_loop(replay, source, interval));
    } else {
        log::info!("No replay source configured, waiting for sensor input");
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    log::info!("Shutting down (samples seen: {})", pipeline.samples_seen());
    pipeline.shutdown().await;

    Ok(())
}

/// Stream every sample of `source` as notifications, one sample per
/// interval, until the pipeline stops
fn replay_loop(pipeline: Orchestrator, source: ReplaySource, interval: Duration) {
    for index in 0..source.len() {
        if pipeline.state() == PipelineState::Stopped {
            return;
        }
        for payload in source.packets(index) {
            pipeline.on_notification(&payload);
        }
        std::thread::sleep(interval);
    }
    log::info!("Replay finished");
}
