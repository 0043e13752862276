//! Continual-Learning Orchestrator
//!
//! Wires assembler -> inference -> buffer -> training worker.
//!
//! Each run has one worker task that receives retraining jobs over a
//! channel and runs each cycle on the blocking pool, so ingestion never
//! waits on an epoch.
//! While a cycle is in flight the pipeline is `Paused`: incoming samples
//! are counted and dropped. Stopping does not cancel an in-flight cycle;
//! its promotion decision still applies but inference stays off.
//!
//! Lock order: state -> jobs -> buffer -> rng.


use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::logic::buffer::{BufferStatus, Offer, SampleBuffer};
use crate::logic::config::PipelineConfig;
use crate::logic::dataset::{HistoryWriter, PromotionRecord};
use crate::logic::events::{dispatch_seizure, AppSurface, CycleReport, EventBus, PipelineEvent};
use crate::logic::model::{ModelError, ModelManager};
use crate::logic::signal::{AssemblerStats, Sample, SignalAssembler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Stopped,
    /// Waiting for the model manager to become ready
    Starting,
    Running,
    /// A retraining cycle is in flight
    Paused,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline already started")]
    AlreadyStarted,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("training worker unavailable")]
    WorkerUnavailable,

    #[error("start-up cancelled")]
    Cancelled,

    #[error("model manager not ready after {attempts} attempts: {source}")]
    Startup {
        attempts: u32,
        #[source]
        source: ModelError,
    },
}

struct TrainingJob {
    cycle_id: Uuid,
    samples: Vec<Sample>,
}

struct Shared {
    config: PipelineConfig,
    manager: Arc<ModelManager>,
    surface: Arc<dyn AppSurface>,
    events: EventBus,
    history: Option<HistoryWriter>,
    learning: AtomicBool,
    samples_seen: AtomicU64,
    state: Mutex<PipelineState>,
    jobs: Mutex<Option<mpsc::UnboundedSender<TrainingJob>>>,
    buffer: Mutex<SampleBuffer>,
    rng: Mutex<StdRng>,
    assembler: Mutex<SignalAssembler>,
    /// Workers from earlier runs stay here until they drain
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheap to clone; all clones drive the same pipeline
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, manager: Arc<ModelManager>, surface: Arc<dyn AppSurface>) -> Self {
        let history = match HistoryWriter::new(&config.artifacts.output_dir) {
            Ok(writer) => Some(writer),
            Err(e) => {
                log::warn!("Promotion history disabled: {}", e);
                None
            }
        };
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            shared: Arc::new(Shared {
                learning: AtomicBool::new(config.continual_learning),
                buffer: Mutex::new(SampleBuffer::new(config.retrain_threshold)),
                config,
                manager,
                surface,
                events: EventBus::new(EVENT_CHANNEL_CAPACITY),
                history,
                samples_seen: AtomicU64::new(0),
                state: Mutex::new(PipelineState::Stopped),
                jobs: Mutex::new(None),
                rng: Mutex::new(rng),
                assembler: Mutex::new(SignalAssembler::new()),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Stopped -> Starting -> Running. Polls the model manager until it
    /// loads, at the configured interval.
    pub async fn start(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.shared.state.lock();
            if *state != PipelineState::Stopped {
                return Err(PipelineError::AlreadyStarted);
            }
            *state = PipelineState::Starting;
        }
        log::info!("Pipeline starting");

        let retry = self.shared.config.startup_retry();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let manager = Arc::clone(&self.shared.manager);
            let result = tokio::task::spawn_blocking(move || manager.initialize()).await;

            match result {
                Ok(Ok(())) => break,
                Ok(Err(e)) => {
                    if matches!(self.shared.config.max_startup_attempts, Some(max) if attempts >= max) {
                        self.abort_start();
                        return Err(PipelineError::Startup { attempts, source: e });
                    }
                    log::warn!(
                        "Model manager not ready (attempt {}): {}. Retrying in {:?}",
                        attempts,
                        e,
                        retry
                    );
                }
                Err(e) => {
                    log::error!("Model initialization task failed: {}", e);
                    self.abort_start();
                    return Err(PipelineError::WorkerUnavailable);
                }
            }

            tokio::time::sleep(retry).await;
            if self.state() != PipelineState::Starting {
                return Err(PipelineError::Cancelled);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.shared.state.lock();
            if *state != PipelineState::Starting {
                return Err(PipelineError::Cancelled);
            }
            *self.shared.jobs.lock() = Some(tx);
            *state = PipelineState::Running;
        }

        let handle = tokio::spawn(worker_loop(Arc::clone(&self.shared), rx));
        {
            let mut workers = self.shared.workers.lock();
            workers.retain(|worker| !worker.is_finished());
            workers.push(handle);
        }

        log::info!(
            "Pipeline running after {} attempt(s) (continual learning {})",
            attempts,
            if self.continual_learning() { "on" } else { "off" }
        );
        self.shared.events.emit(PipelineEvent::Started);
        Ok(())
    }

    fn abort_start(&self) {
        let mut state = self.shared.state.lock();
        if *state == PipelineState::Starting {
            *state = PipelineState::Stopped;
        }
    }

    /// Stop inference. An in-flight training cycle still completes.
    pub fn stop(&self) {
        let was = {
            let mut state = self.shared.state.lock();
            let was = *state;
            if was == PipelineState::Stopped {
                return;
            }
            *state = PipelineState::Stopped;
            // Dropping the sender lets the worker exit after its current job
            self.shared.jobs.lock().take();
            was
        };

        self.shared.assembler.lock().reset();
        if was == PipelineState::Paused {
            log::info!("Pipeline stopping, in-flight training cycle will finish");
        } else {
            log::info!("Pipeline stopped");
        }
        self.shared.events.emit(PipelineEvent::Stopped);
    }

    /// Stop and wait for every training worker to finish, including
    /// ones left running by an earlier stop/start
    pub async fn shutdown(&self) {
        self.stop();
        let handles = std::mem::take(&mut *self.shared.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Training worker ended abnormally: {}", e);
            }
        }
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Feed a raw sensor notification. Returns the prediction when the
    /// notification completed a sample that was classified.
    pub fn on_notification(&self, payload: &[u8]) -> Option<i32> {
        let sample = self.shared.assembler.lock().on_notification(payload)?;
        self.handle_sample(sample)
    }

    /// Classify a sample and collect it for retraining.
    /// Returns `None` when the pipeline is not running.
    pub fn handle_sample(&self, sample: Sample) -> Option<i32> {
        let seen = self.shared.samples_seen.fetch_add(1, Ordering::Relaxed) + 1;

        match self.state() {
            PipelineState::Running => {}
            PipelineState::Paused => {
                log::debug!("Inference paused, training in progress");
                return None;
            }
            PipelineState::Stopped | PipelineState::Starting => {
                log::debug!("Sample #{} dropped, pipeline not running", seen);
                return None;
            }
        }

        let prediction = self.shared.manager.infer(&sample);
        log::debug!(
            "Prediction {} (sample #{}, truth {})",
            prediction,
            seen,
            sample.label()
        );

        if prediction == Sample::SEIZURE {
            log::warn!("Seizure detected at sample #{}", seen);
            self.shared.events.emit(PipelineEvent::SeizureDetected);
            dispatch_seizure(self.shared.surface.as_ref());
        }

        if self.continual_learning() {
            let offer = self.shared.buffer.lock().offer(sample, true);
            if offer == Offer::RetrainDue {
                log::info!("Retrain threshold reached");
                if let Err(e) = self.begin_cycle() {
                    log::warn!("Retraining not started: {}", e);
                }
            }
        }

        Some(prediction)
    }

    /// Retrain on whatever is buffered now, regardless of the threshold.
    /// `Ok(None)` when the buffer is empty.
    pub fn request_training(&self) -> Result<Option<Uuid>, PipelineError> {
        self.begin_cycle()
    }

    /// Hand the buffer to the worker and pause inference
    fn begin_cycle(&self) -> Result<Option<Uuid>, PipelineError> {
        let mut state = self.shared.state.lock();
        if *state != PipelineState::Running {
            return Err(PipelineError::NotRunning);
        }

        let jobs = self.shared.jobs.lock();
        let tx = jobs.as_ref().ok_or(PipelineError::WorkerUnavailable)?;

        let mut buffer = self.shared.buffer.lock();
        if buffer.is_empty() {
            return Ok(None);
        }
        let samples = buffer.take_for_training(&mut *self.shared.rng.lock());
        let count = samples.len();
        let cycle_id = Uuid::new_v4();

        // Announced before the worker can see the job
        self.shared.events.emit(PipelineEvent::TrainingStarted { cycle_id, samples: count });
        if tx.send(TrainingJob { cycle_id, samples }).is_err() {
            buffer.resume();
            self.shared.events.emit(PipelineEvent::TrainingAborted {
                cycle_id,
                reason: "training worker unavailable".to_string(),
            });
            return Err(PipelineError::WorkerUnavailable);
        }
        *state = PipelineState::Paused;

        drop(buffer);
        drop(jobs);
        drop(state);

        log::info!("Retraining cycle {} queued with {} samples", cycle_id, count);
        Ok(Some(cycle_id))
    }

    // ========================================================================
    // CONTROLS & DIAGNOSTICS
    // ========================================================================

    pub fn set_continual_learning(&self, enabled: bool) {
        self.shared.learning.store(enabled, Ordering::Relaxed);
        log::info!("Continual learning {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn continual_learning(&self) -> bool {
        self.shared.learning.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    pub fn samples_seen(&self) -> u64 {
        self.shared.samples_seen.load(Ordering::Relaxed)
    }

    pub fn buffer_status(&self) -> BufferStatus {
        self.shared.buffer.lock().status()
    }

    pub fn assembler_stats(&self) -> AssemblerStats {
        self.shared.assembler.lock().stats()
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.shared.manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }
}

// ============================================================================
// TRAINING WORKER
// ============================================================================

async fn worker_loop(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<TrainingJob>) {
    while let Some(job) = rx.recv().await {
        let cycle_id = job.cycle_id;
        let worker = Arc::clone(&shared);

        let result = match tokio::task::spawn_blocking(move || worker.run_cycle(job)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("training task failed: {}", e)),
        };
        shared.finish_cycle(cycle_id, result);
    }
    log::debug!("Training worker exited");
}

impl Shared {
    /// Epochs, then the promotion decision. Runs on the blocking pool.
    fn run_cycle(&self, job: TrainingJob) -> Result<CycleReport, ModelError> {
        let started = Instant::now();
        let epochs = self.config.epochs;

        log::info!("Training on {} samples for {} epochs", job.samples.len(), epochs);
        for _ in 0..epochs {
            self.manager.train_epoch(&job.samples)?;
        }

        let outcome = self.manager.promote()?;
        log::info!(
            "Cycle {}: current {} | candidate {} -> {}",
            job.cycle_id,
            outcome.current(),
            outcome.candidate(),
            if outcome.is_promoted() { "promoted" } else { "rejected" }
        );

        Ok(CycleReport {
            cycle_id: job.cycle_id,
            samples: job.samples.len(),
            epochs,
            current: outcome.current(),
            candidate: outcome.candidate(),
            promoted: outcome.is_promoted(),
            generation: outcome.generation(),
            artifact_sha256: outcome.artifact_sha256().map(str::to_string),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn finish_cycle(&self, cycle_id: Uuid, result: Result<CycleReport, String>) {
        {
            let mut state = self.state.lock();
            self.buffer.lock().resume();
            if *state == PipelineState::Paused {
                *state = PipelineState::Running;
            }
        }

        match result {
            Ok(report) => {
                self.record_history(&report);
                self.events.emit(PipelineEvent::TrainingFinished(report));
            }
            Err(reason) => {
                log::error!("Retraining cycle {} aborted: {}", cycle_id, reason);
                self.events.emit(PipelineEvent::TrainingAborted { cycle_id, reason });
            }
        }
    }

    fn record_history(&self, report: &CycleReport) {
        let Some(history) = self.history.as_ref() else {
            return;
        };

        let record = PromotionRecord {
            cycle_id: report.cycle_id,
            timestamp: Utc::now(),
            samples: report.samples,
            epochs: report.epochs,
            current: report.current,
            candidate: report.candidate,
            promoted: report.promoted,
            generation: report.generation,
            artifact_sha256: report.artifact_sha256.clone(),
        };
        if let Err(e) = history.append(&record) {
            log::warn!("Failed to record promotion history: {}", e);
        }
    }
}
