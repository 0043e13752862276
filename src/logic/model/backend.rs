//! Model Backends
//!
//! Opens serving and trainable models from checkpoint references, so the
//! manager never deals with runtime specifics.

use std::path::PathBuf;
use std::sync::Arc;

use crate::logic::config::ArtifactPaths;
use super::checkpoint::CheckpointRef;
use super::inference::{OnnxServingModel, ServingModel};
use super::training::TrainableModel;
use super::ModelError;

pub trait ModelBackend: Send + Sync {
    fn open_serving(&self, checkpoint: &CheckpointRef) -> Result<Arc<dyn ServingModel>, ModelError>;

    fn open_trainable(&self, checkpoint: &CheckpointRef) -> Result<Box<dyn TrainableModel>, ModelError>;
}

/// ONNX Runtime backend. Training needs the `training` cargo feature.
pub struct OnnxBackend {
    training_model: PathBuf,
    eval_model: PathBuf,
    optimizer_model: PathBuf,
}

impl OnnxBackend {
    pub fn from_artifacts(artifacts: &ArtifactPaths) -> Self {
        Self {
            training_model: artifacts.training_model.clone(),
            eval_model: artifacts.eval_model.clone(),
            optimizer_model: artifacts.optimizer_model.clone(),
        }
    }
}

impl ModelBackend for OnnxBackend {
    fn open_serving(&self, checkpoint: &CheckpointRef) -> Result<Arc<dyn ServingModel>, ModelError> {
        Ok(Arc::new(OnnxServingModel::load(&checkpoint.path)?))
    }

    #[cfg(feature = "training")]
    fn open_trainable(&self, checkpoint: &CheckpointRef) -> Result<Box<dyn TrainableModel>, ModelError> {
        Ok(Box::new(super::training::OnnxTrainableModel::open(
            &checkpoint.path,
            &self.training_model,
            &self.eval_model,
            &self.optimizer_model,
        )?))
    }

    #[cfg(not(feature = "training"))]
    fn open_trainable(&self, checkpoint: &CheckpointRef) -> Result<Box<dyn TrainableModel>, ModelError> {
        log::debug!(
            "Skipping trainer for {} (models: {}, {}, {})",
            checkpoint.path.display(),
            self.training_model.display(),
            self.eval_model.display(),
            self.optimizer_model.display()
        );
        Err(ModelError::TrainerUnavailable(
            "built without the `training` feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_missing_serving_artifact() {
        let backend = OnnxBackend::from_artifacts(&ArtifactPaths::under(Path::new("/nonexistent")));
        let result = backend.open_serving(&CheckpointRef::new("/nonexistent/model.onnx", 0));
        assert!(matches!(result, Err(ModelError::ArtifactMissing(_))));
    }

    #[cfg(not(feature = "training"))]
    #[test]
    fn test_trainer_requires_feature() {
        let backend = OnnxBackend::from_artifacts(&ArtifactPaths::under(Path::new("/tmp")));
        let result = backend.open_trainable(&CheckpointRef::new("/tmp/checkpoint", 0));
        assert!(matches!(result, Err(ModelError::TrainerUnavailable(_))));
    }
}
