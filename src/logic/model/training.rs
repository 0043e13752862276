//! Trainable Model
//!
//! The mutable half of the model pair. Gradients accumulate over
//! `train_step` calls and are applied by a single `optimizer_step`.

use std::path::Path;

use crate::logic::signal::Sample;
use super::ModelError;

pub trait TrainableModel: Send {
    /// Forward and backward pass for one sample, returns its loss
    fn train_step(&mut self, sample: &Sample) -> Result<f32, ModelError>;

    fn optimizer_step(&mut self) -> Result<(), ModelError>;

    fn reset_grad(&mut self) -> Result<(), ModelError>;

    /// Write an inference graph and a resumable training checkpoint
    fn export(&mut self, model_out: &Path, checkpoint_out: &Path) -> Result<(), ModelError>;
}

/// One epoch: a step per sample, then one optimizer update.
/// Returns the mean loss.
pub fn run_epoch(model: &mut dyn TrainableModel, samples: &[Sample]) -> Result<f32, ModelError> {
    let mut loss = 0.0f32;
    for sample in samples {
        loss += model.train_step(sample)?;
    }
    model.optimizer_step()?;
    model.reset_grad()?;

    Ok(if samples.is_empty() { 0.0 } else { loss / samples.len() as f32 })
}

// ============================================================================
// ONNX RUNTIME TRAINER
// ============================================================================

#[cfg(feature = "training")]
pub use onnx::OnnxTrainableModel;

#[cfg(feature = "training")]
mod onnx {
    use std::path::Path;

    use ndarray::Array1;
    use ort::memory::Allocator;
    use ort::session::Session;
    use ort::training::{Checkpoint, Trainer};
    use ort::value::Value;

    use super::{TrainableModel, ModelError};
    use crate::logic::model::inference::input_tensor;
    use crate::logic::signal::Sample;

    /// Output exported into the inference graph
    const OUTPUT_NAME: &str = "output";

    pub struct OnnxTrainableModel {
        trainer: Trainer,
    }

    impl OnnxTrainableModel {
        pub fn open(
            checkpoint: &Path,
            training_model: &Path,
            eval_model: &Path,
            optimizer_model: &Path,
        ) -> Result<Self, ModelError> {
            for path in [checkpoint, training_model, eval_model, optimizer_model] {
                if !path.exists() {
                    return Err(ModelError::ArtifactMissing(path.to_path_buf()));
                }
            }

            let checkpoint = Checkpoint::load(checkpoint)
                .map_err(|e| ModelError::execution("load checkpoint", e))?;
            let builder = Session::builder().map_err(|e| ModelError::execution("session builder", e))?;
            let trainer = Trainer::new(
                builder,
                Allocator::default(),
                checkpoint,
                training_model,
                eval_model,
                optimizer_model,
            )
            .map_err(|e| ModelError::execution("create trainer", e))?;

            log::info!("ONNX trainer ready ({})", training_model.display());
            Ok(Self { trainer })
        }
    }

    impl TrainableModel for OnnxTrainableModel {
        fn train_step(&mut self, sample: &Sample) -> Result<f32, ModelError> {
            let input = Value::from_array(input_tensor(sample)?)
                .map_err(|e| ModelError::execution("tensor", e))?;
            let label = Value::from_array(Array1::from_elem(1, sample.training_label()))
                .map_err(|e| ModelError::execution("label tensor", e))?;

            let outputs = self
                .trainer
                .step(ort::inputs![input], ort::inputs![label])
                .map_err(|e| ModelError::execution("train step", e))?;

            let loss = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::execution("extract loss", e))?;
            loss.1
                .first()
                .copied()
                .ok_or_else(|| ModelError::Output("empty loss".to_string()))
        }

        fn optimizer_step(&mut self) -> Result<(), ModelError> {
            self.trainer
                .optimizer()
                .step()
                .map_err(|e| ModelError::execution("optimizer step", e))
        }

        fn reset_grad(&mut self) -> Result<(), ModelError> {
            self.trainer
                .optimizer()
                .reset_grad()
                .map_err(|e| ModelError::execution("reset grad", e))
        }

        fn export(&mut self, model_out: &Path, checkpoint_out: &Path) -> Result<(), ModelError> {
            self.trainer
                .export(model_out, [OUTPUT_NAME])
                .map_err(|e| ModelError::execution("export model", e))?;
            self.trainer
                .checkpoint()
                .save(checkpoint_out, true)
                .map_err(|e| ModelError::execution("save checkpoint", e))
        }
    }
}
