//! Model Module - Serving, Training & Promotion
//!
//! One frozen serving model answers live inference while a separate
//! trainable model learns from buffered samples. A retrained candidate
//! replaces the serving model only when it scores a higher F1 on the
//! validation set.

pub mod backend;
pub mod checkpoint;
pub mod inference;
pub mod manager;
pub mod metrics;
pub mod training;


use std::path::PathBuf;

use thiserror::Error;

use crate::logic::dataset::DatasetError;

// Re-export common types
pub use backend::{ModelBackend, OnnxBackend};
pub use checkpoint::{ArtifactLayout, Checkpoint, CheckpointRef, OptimizerState};
pub use inference::{OnnxServingModel, ServingModel};
pub use manager::{ManagerState, ManagerStats, ModelManager, PromotionOutcome, NO_DECISION};
pub use metrics::{ConfusionMatrix, Metrics};
pub use training::TrainableModel;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    #[error("model manager is not ready")]
    NotReady,

    #[error("trainable model unavailable: {0}")]
    TrainerUnavailable(String),

    #[error("model execution failed: {0}")]
    Execution(String),

    #[error("unexpected model output: {0}")]
    Output(String),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation data error: {0}")]
    Dataset(#[from] DatasetError),
}

impl ModelError {
    /// Wrap a runtime error with the step that produced it
    pub(crate) fn execution(step: &str, err: impl std::fmt::Display) -> Self {
        ModelError::Execution(format!("{}: {}", step, err))
    }
}
