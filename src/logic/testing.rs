//! In-memory backends and surfaces for scenario tests.
//!
//! Scripted models store a single integer "skill" in their artifact files.
//! A serving model with skill `s` answers correctly for samples whose id
//! modulo 10 is below `s`, so higher skill means higher F1.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tempfile::TempDir;

use crate::constants::SAMPLE_LEN;
use crate::logic::config::ArtifactPaths;
use crate::logic::dataset::ValidationSet;
use crate::logic::events::AppSurface;
use crate::logic::model::{CheckpointRef, ModelBackend, ModelError, ServingModel, TrainableModel};
use crate::logic::signal::Sample;

pub const MAX_SKILL: i64 = 10;

/// Sample tagged with `id` in `data[0]` and its truth in `data[1]`.
/// A negative id makes scripted models fail on it.
pub fn tagged(id: i64, label: i32) -> Sample {
    let mut data = vec![0.0; SAMPLE_LEN];
    data[0] = id as f32;
    data[1] = label as f32;
    Sample::new(data, label).unwrap()
}

pub fn id_of(sample: &Sample) -> i64 {
    sample.data()[0] as i64
}

/// `count` samples with alternating labels 0/1
pub fn alternating(count: usize) -> Vec<Sample> {
    (0..count).map(|i| tagged(i as i64, (i % 2) as i32)).collect()
}

fn read_skill(path: &Path) -> Result<i64, ModelError> {
    let text = std::fs::read_to_string(path)?;
    text.trim()
        .parse()
        .map_err(|e| ModelError::Output(format!("bad scripted artifact: {}", e)))
}

// ============================================================================
// GATE
// ============================================================================

/// Blocks scripted training until opened
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            open: Mutex::new(true),
            cv: Condvar::new(),
        }
    }
}

impl Gate {
    pub fn close(&self) {
        *self.open.lock() = false;
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
    }
}

// ============================================================================
// SCRIPTED MODELS
// ============================================================================

pub struct ScriptedServing {
    pub skill: i64,
}

impl ServingModel for ScriptedServing {
    fn predict(&self, sample: &Sample) -> Result<i32, ModelError> {
        let id = id_of(sample);
        if id < 0 {
            return Err(ModelError::Execution("scripted failure".to_string()));
        }
        let truth = sample.data()[1] as i32;
        Ok(if id % 10 < self.skill { truth } else { 1 - truth })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedTrainable {
    skill: i64,
    gain: Arc<AtomicI64>,
    current: Vec<i64>,
    epochs: Arc<Mutex<Vec<Vec<i64>>>>,
    gate: Arc<Gate>,
}

impl TrainableModel for ScriptedTrainable {
    fn train_step(&mut self, sample: &Sample) -> Result<f32, ModelError> {
        let id = id_of(sample);
        if id < 0 {
            return Err(ModelError::Execution("scripted training failure".to_string()));
        }
        self.current.push(id);
        Ok(1.0 / (1.0 + self.skill as f32))
    }

    fn optimizer_step(&mut self) -> Result<(), ModelError> {
        self.gate.wait();
        self.skill = (self.skill + self.gain.load(Ordering::SeqCst)).clamp(0, MAX_SKILL);
        self.epochs.lock().push(std::mem::take(&mut self.current));
        Ok(())
    }

    fn reset_grad(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    fn export(&mut self, model_out: &Path, checkpoint_out: &Path) -> Result<(), ModelError> {
        std::fs::write(model_out, self.skill.to_string())?;
        std::fs::write(checkpoint_out, self.skill.to_string())?;
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedBackend {
    /// Skill change applied per optimizer step
    pub gain: Arc<AtomicI64>,
    /// Sample ids seen by each epoch, in training order
    pub epochs: Arc<Mutex<Vec<Vec<i64>>>>,
    pub gate: Arc<Gate>,
    pub trainer_disabled: AtomicBool,
    /// Serving opens that fail before one succeeds
    pub failing_opens: AtomicUsize,
    pub serving_opens: AtomicUsize,
    pub trainable_opens: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_gain(gain: i64) -> Arc<Self> {
        let backend = Self::default();
        backend.gain.store(gain, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn set_gain(&self, gain: i64) {
        self.gain.store(gain, Ordering::SeqCst);
    }

    pub fn epoch_log(&self) -> Vec<Vec<i64>> {
        self.epochs.lock().clone()
    }
}

impl ModelBackend for ScriptedBackend {
    fn open_serving(&self, checkpoint: &CheckpointRef) -> Result<Arc<dyn ServingModel>, ModelError> {
        let remaining = self.failing_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(ModelError::ArtifactMissing(checkpoint.path.clone()));
        }
        self.serving_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedServing { skill: read_skill(&checkpoint.path)? }))
    }

    fn open_trainable(&self, checkpoint: &CheckpointRef) -> Result<Box<dyn TrainableModel>, ModelError> {
        if self.trainer_disabled.load(Ordering::SeqCst) {
            return Err(ModelError::TrainerUnavailable("disabled".to_string()));
        }
        self.trainable_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTrainable {
            skill: read_skill(&checkpoint.path)?,
            gain: Arc::clone(&self.gain),
            current: Vec::new(),
            epochs: Arc::clone(&self.epochs),
            gate: Arc::clone(&self.gate),
        }))
    }
}

// ============================================================================
// ARTIFACT FIXTURE
// ============================================================================

pub struct Fixture {
    pub dir: TempDir,
    pub artifacts: ArtifactPaths,
}

impl Fixture {
    /// Serving model and checkpoint at `skill`, plus a 20-row validation set
    pub fn new(skill: i64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactPaths::under(dir.path());

        for path in [&artifacts.serving_model, &artifacts.checkpoint, &artifacts.validation_set] {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        }
        std::fs::write(&artifacts.serving_model, skill.to_string()).unwrap();
        std::fs::write(&artifacts.checkpoint, skill.to_string()).unwrap();
        std::fs::write(&artifacts.validation_set, Self::validation().to_bytes()).unwrap();

        Self { dir, artifacts }
    }

    pub fn validation() -> ValidationSet {
        ValidationSet::from_samples(alternating(20))
    }
}

// ============================================================================
// SURFACE
// ============================================================================

#[derive(Default)]
pub struct RecordingSurface {
    pub foreground: AtomicBool,
    pub alerts: AtomicUsize,
    pub notifications: AtomicUsize,
}

impl AppSurface for RecordingSurface {
    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    fn show_seizure_alert(&self) {
        self.alerts.fetch_add(1, Ordering::SeqCst);
    }

    fn post_seizure_notification(&self) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
}
