//! Model Manager
//!
//! Owns the serving slot and the trainable slot. Inference reads the
//! serving slot through a shared `Arc`; only `promote` replaces it, and
//! only after both current and candidate metrics are known.
//!
//! Lock order: trainable -> serving -> last_metrics.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::logic::config::{ArtifactPaths, RejectedCandidatePolicy};
use crate::logic::dataset::ValidationSet;
use crate::logic::signal::Sample;
use super::backend::ModelBackend;
use super::checkpoint::{file_digest, ArtifactLayout, Checkpoint, CheckpointRef, OptimizerState};
use super::inference::ServingModel;
use super::metrics::{ConfusionMatrix, Metrics};
use super::training::{run_epoch, TrainableModel};
use super::ModelError;

/// Returned by `infer` when the serving model fails
pub const NO_DECISION: i32 = -1;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerState {
    /// No models loaded
    Idle,
    Ready,
    /// An epoch is running on the trainable model
    Training,
}

/// Manager counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub inferences: u64,
    pub inference_failures: u64,
    pub epochs: u64,
    pub validations: u64,
    pub promotions: u64,
    pub rejections: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    Promoted {
        current: Metrics,
        candidate: Metrics,
        generation: u64,
        artifact_sha256: Option<String>,
    },
    Rejected {
        current: Metrics,
        candidate: Metrics,
        /// Generation that keeps serving
        generation: u64,
    },
}

impl PromotionOutcome {
    pub fn is_promoted(&self) -> bool {
        matches!(self, PromotionOutcome::Promoted { .. })
    }

    pub fn current(&self) -> Metrics {
        match self {
            PromotionOutcome::Promoted { current, .. } | PromotionOutcome::Rejected { current, .. } => *current,
        }
    }

    pub fn candidate(&self) -> Metrics {
        match self {
            PromotionOutcome::Promoted { candidate, .. }
            | PromotionOutcome::Rejected { candidate, .. } => *candidate,
        }
    }

    /// Generation serving after the decision
    pub fn generation(&self) -> u64 {
        match self {
            PromotionOutcome::Promoted { generation, .. }
            | PromotionOutcome::Rejected { generation, .. } => *generation,
        }
    }

    pub fn artifact_sha256(&self) -> Option<&str> {
        match self {
            PromotionOutcome::Promoted { artifact_sha256, .. } => artifact_sha256.as_deref(),
            PromotionOutcome::Rejected { .. } => None,
        }
    }
}

struct ServingSlot {
    checkpoint: Checkpoint,
    model: Arc<dyn ServingModel>,
    /// Training checkpoint the serving weights were exported with
    training_checkpoint: PathBuf,
}

struct TrainableSlot {
    checkpoint: Checkpoint,
    model: Box<dyn TrainableModel>,
}

#[derive(Default)]
struct Counters {
    inferences: AtomicU64,
    inference_failures: AtomicU64,
    epochs: AtomicU64,
    validations: AtomicU64,
    promotions: AtomicU64,
    rejections: AtomicU64,
}

// ============================================================================
// MANAGER
// ============================================================================

pub struct ModelManager {
    backend: Arc<dyn ModelBackend>,
    artifacts: ArtifactPaths,
    layout: ArtifactLayout,
    policy: RejectedCandidatePolicy,
    state: RwLock<ManagerState>,
    serving: RwLock<Option<Arc<ServingSlot>>>,
    trainable: Mutex<Option<TrainableSlot>>,
    validation: Mutex<Option<Arc<ValidationSet>>>,
    last_metrics: RwLock<Option<Metrics>>,
    counters: Counters,
}

impl ModelManager {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        artifacts: ArtifactPaths,
        policy: RejectedCandidatePolicy,
    ) -> Self {
        Self {
            backend,
            layout: ArtifactLayout::new(artifacts.output_dir.clone()),
            artifacts,
            policy,
            state: RwLock::new(ManagerState::Idle),
            serving: RwLock::new(None),
            trainable: Mutex::new(None),
            validation: Mutex::new(None),
            last_metrics: RwLock::new(None),
            counters: Counters::default(),
        }
    }

    /// Load models (Idle -> Ready). Resumes from the newest promoted
    /// generation when one exists. A missing trainer is not fatal.
    pub fn initialize(&self) -> Result<(), ModelError> {
        if self.is_ready() {
            return Ok(());
        }

        self.layout.prepare()?;

        let (model_path, checkpoint_path, generation) = match self.layout.latest_generation() {
            Some(g) => (self.layout.promoted_model(g), self.layout.promoted_checkpoint(g), g),
            None => (self.artifacts.serving_model.clone(), self.artifacts.checkpoint.clone(), 0),
        };

        if !model_path.exists() {
            return Err(ModelError::ArtifactMissing(model_path));
        }

        let reference = CheckpointRef::new(model_path, generation);
        let model = self.backend.open_serving(&reference)?;
        log::info!(
            "Serving model {} (generation {}) loaded",
            model.name(),
            generation
        );

        let trainable = match self.load_trainable(&checkpoint_path, generation) {
            Ok(slot) => Some(slot),
            Err(e) => {
                log::warn!("Continual learning unavailable: {}", e);
                None
            }
        };

        *self.trainable.lock() = trainable;
        *self.serving.write() = Some(Arc::new(ServingSlot {
            checkpoint: Checkpoint::Serving(reference),
            model,
            training_checkpoint: checkpoint_path,
        }));
        *self.state.write() = ManagerState::Ready;

        Ok(())
    }

    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() != ManagerState::Idle
    }

    pub fn has_trainer(&self) -> bool {
        self.trainable.lock().is_some()
    }

    // ========================================================================
    // INFERENCE
    // ========================================================================

    /// Classify a sample, `NO_DECISION` on failure
    pub fn infer(&self, sample: &Sample) -> i32 {
        self.counters.inferences.fetch_add(1, Ordering::Relaxed);

        match self.try_infer(sample) {
            Ok(label) => {
                log::debug!("Inference result: {}", label);
                label
            }
            Err(e) => {
                self.counters.inference_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Inference failed: {}", e);
                NO_DECISION
            }
        }
    }

    pub fn try_infer(&self, sample: &Sample) -> Result<i32, ModelError> {
        self.active()?.model.predict(sample)
    }

    // ========================================================================
    // TRAINING
    // ========================================================================

    /// One pass over `samples` in the given order
    pub fn train_epoch(&self, samples: &[Sample]) -> Result<(), ModelError> {
        if !self.is_ready() {
            return Err(ModelError::NotReady);
        }

        let mut trainable = self.trainable.lock();
        let slot = trainable
            .as_mut()
            .ok_or_else(|| ModelError::TrainerUnavailable("no trainable model loaded".to_string()))?;

        *self.state.write() = ManagerState::Training;
        let result = run_epoch(slot.model.as_mut(), samples);
        *self.state.write() = ManagerState::Ready;

        let loss = result?;
        if let Checkpoint::Training(_, optimizer) = &mut slot.checkpoint {
            optimizer.steps += 1;
        }
        let epoch = self.counters.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Epoch {} done: {} samples, mean loss {:.4}", epoch, samples.len(), loss);

        Ok(())
    }

    // ========================================================================
    // VALIDATION
    // ========================================================================

    /// Metrics of the serving model on `set`
    pub fn validate(&self, set: &ValidationSet) -> Result<Metrics, ModelError> {
        let active = self.active()?;
        self.evaluate(active.model.as_ref(), set)
    }

    /// The configured validation blob, loaded once
    pub fn validation_set(&self) -> Result<Arc<ValidationSet>, ModelError> {
        let mut cached = self.validation.lock();
        if let Some(set) = cached.as_ref() {
            return Ok(Arc::clone(set));
        }

        let set = Arc::new(ValidationSet::load(&self.artifacts.validation_set)?);
        if set.labeled_count() == 0 {
            log::warn!("Validation set has no labels, every candidate scores 0");
        }
        *cached = Some(Arc::clone(&set));
        Ok(set)
    }

    fn evaluate(&self, model: &dyn ServingModel, set: &ValidationSet) -> Result<Metrics, ModelError> {
        let mut confusion = ConfusionMatrix::default();
        for sample in set.samples() {
            let prediction = model.predict(sample)?;
            confusion.record(sample.label(), prediction);
        }
        self.counters.validations.fetch_add(1, Ordering::Relaxed);

        log::debug!(
            "Validated {} on {} rows: {:?}",
            model.name(),
            confusion.total(),
            confusion
        );
        Ok(Metrics::from_confusion(&confusion))
    }

    // ========================================================================
    // PROMOTION
    // ========================================================================

    /// Validate current and candidate on the configured set and swap on
    /// strict F1 improvement
    pub fn promote(&self) -> Result<PromotionOutcome, ModelError> {
        let set = self.validation_set()?;
        self.promote_against(&set)
    }

    pub fn promote_against(&self, set: &ValidationSet) -> Result<PromotionOutcome, ModelError> {
        let mut trainable = self.trainable.lock();
        let slot = trainable
            .as_mut()
            .ok_or_else(|| ModelError::TrainerUnavailable("no trainable model loaded".to_string()))?;

        let active = self.active()?;
        let generation = active.checkpoint.generation();
        let current = self.evaluate(active.model.as_ref(), set)?;
        log::info!("Current model (g{}): {}", generation, current);

        let next = generation + 1;
        let (candidate_model, candidate) = match self.evaluate_candidate(slot, set, next) {
            Ok(result) => result,
            Err(e) => {
                self.layout.discard_candidate();
                return Err(e);
            }
        };
        log::info!("Candidate model: {}", candidate);

        if !candidate.improves_on(&current) {
            self.layout.discard_candidate();
            self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            *self.last_metrics.write() = Some(current);
            log::info!(
                "Candidate rejected (f1 {:.3} <= {:.3}), generation {} keeps serving",
                candidate.f1,
                current.f1,
                generation
            );

            if self.policy == RejectedCandidatePolicy::ResetToServing {
                match self.load_trainable(&active.training_checkpoint, generation) {
                    Ok(fresh) => *slot = fresh,
                    Err(e) => log::warn!("Trainer reset failed, keeping current weights: {}", e),
                }
            }

            return Ok(PromotionOutcome::Rejected {
                current,
                candidate,
                generation,
            });
        }

        let (model_path, checkpoint_path) = match self.layout.commit_candidate(next) {
            Ok(paths) => paths,
            Err(e) => {
                self.layout.discard_candidate();
                return Err(e.into());
            }
        };

        let artifact_sha256 = match file_digest(&model_path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                log::warn!("Could not hash {}: {}", model_path.display(), e);
                None
            }
        };

        *self.serving.write() = Some(Arc::new(ServingSlot {
            checkpoint: Checkpoint::Serving(CheckpointRef::new(model_path.clone(), next)),
            model: candidate_model,
            training_checkpoint: checkpoint_path.clone(),
        }));
        self.counters.promotions.fetch_add(1, Ordering::Relaxed);
        *self.last_metrics.write() = Some(candidate);

        match self.load_trainable(&checkpoint_path, next) {
            Ok(fresh) => *slot = fresh,
            Err(e) => log::warn!("Trainer reload failed, continuing in memory: {}", e),
        }

        log::info!(
            "Promoted candidate to generation {} ({})",
            next,
            model_path.display()
        );

        Ok(PromotionOutcome::Promoted {
            current,
            candidate,
            generation: next,
            artifact_sha256,
        })
    }

    /// Export the trainable model and score the exported graph
    fn evaluate_candidate(
        &self,
        slot: &mut TrainableSlot,
        set: &ValidationSet,
        generation: u64,
    ) -> Result<(Arc<dyn ServingModel>, Metrics), ModelError> {
        let model_out = self.layout.candidate_model();
        slot.model.export(&model_out, &self.layout.candidate_checkpoint())?;

        let model = self.backend.open_serving(&CheckpointRef::new(model_out, generation))?;
        let metrics = self.evaluate(model.as_ref(), set)?;
        Ok((model, metrics))
    }

    fn load_trainable(&self, checkpoint: &Path, generation: u64) -> Result<TrainableSlot, ModelError> {
        if !checkpoint.exists() {
            return Err(ModelError::ArtifactMissing(checkpoint.to_path_buf()));
        }

        let reference = CheckpointRef::new(checkpoint, generation);
        let model = self.backend.open_trainable(&reference)?;
        Ok(TrainableSlot {
            checkpoint: Checkpoint::Training(
                reference,
                OptimizerState {
                    optimizer_model: self.artifacts.optimizer_model.clone(),
                    steps: 0,
                },
            ),
            model,
        })
    }

    // ========================================================================
    // DIAGNOSTICS
    // ========================================================================

    fn active(&self) -> Result<Arc<ServingSlot>, ModelError> {
        self.serving.read().clone().ok_or(ModelError::NotReady)
    }

    /// Checkpoint currently serving inference
    pub fn active_checkpoint(&self) -> Option<Checkpoint> {
        self.serving.read().as_ref().map(|slot| slot.checkpoint.clone())
    }

    /// Checkpoint the trainer is working from
    pub fn training_checkpoint(&self) -> Option<Checkpoint> {
        self.trainable.lock().as_ref().map(|slot| slot.checkpoint.clone())
    }

    /// Metrics of the model serving after the last promotion decision
    pub fn last_metrics(&self) -> Option<Metrics> {
        *self.last_metrics.read()
    }

    pub fn stats(&self) -> ManagerStats {
        let c = &self.counters;
        ManagerStats {
            inferences: c.inferences.load(Ordering::Relaxed),
            inference_failures: c.inference_failures.load(Ordering::Relaxed),
            epochs: c.epochs.load(Ordering::Relaxed),
            validations: c.validations.load(Ordering::Relaxed),
            promotions: c.promotions.load(Ordering::Relaxed),
            rejections: c.rejections.load(Ordering::Relaxed),
        }
    }
}
