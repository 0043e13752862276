//! Inference Engine - ONNX Runtime Integration
//!
//! Serving models are frozen: `predict` never mutates weights, so the
//! same sample always yields the same class.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::Array3;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::constants::{CHANNELS, TIMESTEPS};
use crate::logic::signal::Sample;
use super::ModelError;

// ============================================================================
// SERVING MODEL TRAIT
// ============================================================================

/// Frozen classifier used for live inference and validation
pub trait ServingModel: Send + Sync {
    /// Predicted class (arg-max over the output logits)
    fn predict(&self, sample: &Sample) -> Result<i32, ModelError>;

    fn name(&self) -> &str;
}

// ============================================================================
// ONNX IMPLEMENTATION
// ============================================================================

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_path: PathBuf,
    pub output_name: String,
    pub loaded_at: DateTime<Utc>,
}

pub struct OnnxServingModel {
    session: Mutex<Session>,
    metadata: ModelMetadata,
    name: String,
}

impl OnnxServingModel {
    /// Load ONNX model from file
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        log::info!("Loading ONNX model from: {}", model_path.display());

        if !model_path.exists() {
            return Err(ModelError::ArtifactMissing(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| ModelError::execution("session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::execution("optimization level", e))?
            .commit_from_file(model_path)
            .map_err(|e| ModelError::execution("load model", e))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelError::Output("no output defined".to_string()))?;

        let name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        log::info!("ONNX model {} loaded (output '{}')", name, output_name);

        Ok(Self {
            session: Mutex::new(session),
            metadata: ModelMetadata {
                model_path: model_path.to_path_buf(),
                output_name,
                loaded_at: Utc::now(),
            },
            name,
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl ServingModel for OnnxServingModel {
    fn predict(&self, sample: &Sample) -> Result<i32, ModelError> {
        let input = input_tensor(sample)?;
        let input = Value::from_array(input).map_err(|e| ModelError::execution("tensor", e))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| ModelError::execution("inference", e))?;

        let output = outputs
            .get(&self.metadata.output_name)
            .ok_or_else(|| ModelError::Output(format!("missing '{}'", self.metadata.output_name)))?;

        let logits = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::execution("extract", e))?;

        argmax(logits.1).ok_or_else(|| ModelError::Output("empty logits".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// `[1, CHANNELS, TIMESTEPS]` view of the flat sample
pub fn input_tensor(sample: &Sample) -> Result<Array3<f32>, ModelError> {
    Ok(Array3::from_shape_vec((1, CHANNELS, TIMESTEPS), sample.data().to_vec())?)
}

/// Index of the largest logit; the first one wins ties
pub fn argmax(logits: &[f32]) -> Option<i32> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in logits.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i as i32)
}
