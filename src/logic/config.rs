//! Pipeline Configuration
//!
//! Defaults, then an optional JSON file, then `SEIZURE_GUARD_*` environment
//! overrides. Continual learning can additionally be switched at runtime
//! on the orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    env_flag, env_parse, get_config_path, get_data_dir, DEFAULT_EPOCHS,
    DEFAULT_RETRAIN_THRESHOLD, DEFAULT_STARTUP_RETRY_MS, ENV_CONTINUAL_LEARNING, ENV_EPOCHS,
    ENV_RETRAIN_THRESHOLD, ENV_STARTUP_RETRY_MS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ============================================================================
// REJECTED CANDIDATE POLICY
// ============================================================================

/// What the trainable model continues from after a candidate is rejected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectedCandidatePolicy {
    /// Keep training the rejected weights on the next cycle
    #[default]
    WarmStart,
    /// Reload the trainable model from the active checkpoint
    ResetToServing,
}

// ============================================================================
// ARTIFACT PATHS
// ============================================================================

/// Model artifacts supplied at start-up, plus where promoted ones go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub serving_model: PathBuf,
    pub training_model: PathBuf,
    pub eval_model: PathBuf,
    pub optimizer_model: PathBuf,
    pub checkpoint: PathBuf,
    pub validation_set: PathBuf,
    pub output_dir: PathBuf,
}

impl ArtifactPaths {
    /// Standard layout below `root`
    pub fn under(root: &Path) -> Self {
        let training = root.join("training_artifacts");
        Self {
            serving_model: root.join("inference_artifacts").join("inference.onnx"),
            training_model: training.join("training_model.onnx"),
            eval_model: training.join("eval_model.onnx"),
            optimizer_model: training.join("optimizer_model.onnx"),
            checkpoint: training.join("checkpoint"),
            validation_set: root.join("data").join("validation.bin"),
            output_dir: root.join("promoted"),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::under(&get_data_dir())
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub continual_learning: bool,
    pub epochs: usize,
    pub retrain_threshold: usize,
    pub startup_retry_ms: u64,
    /// `None` retries until stopped
    pub max_startup_attempts: Option<u32>,
    /// `None` seeds the shuffle from OS entropy
    pub shuffle_seed: Option<u64>,
    pub on_rejected: RejectedCandidatePolicy,
    pub artifacts: ArtifactPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continual_learning: false,
            epochs: DEFAULT_EPOCHS,
            retrain_threshold: DEFAULT_RETRAIN_THRESHOLD,
            startup_retry_ms: DEFAULT_STARTUP_RETRY_MS,
            max_startup_attempts: None,
            shuffle_seed: None,
            on_rejected: RejectedCandidatePolicy::default(),
            artifacts: ArtifactPaths::default(),
        }
    }
}

impl PipelineConfig {
    /// Full resolution: defaults, `SEIZURE_GUARD_CONFIG` file, env overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match get_config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Some(enabled) = env_flag(ENV_CONTINUAL_LEARNING) {
            self.continual_learning = enabled;
        }
        if let Some(epochs) = env_parse(ENV_EPOCHS) {
            self.epochs = epochs;
        }
        if let Some(threshold) = env_parse(ENV_RETRAIN_THRESHOLD) {
            self.retrain_threshold = threshold;
        }
        if let Some(ms) = env_parse(ENV_STARTUP_RETRY_MS) {
            self.startup_retry_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(ConfigError::Invalid {
                field: "epochs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retrain_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "retrain_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn startup_retry(&self) -> Duration {
        Duration::from_millis(self.startup_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(!config.continual_learning);
        assert_eq!(config.epochs, 20);
        assert_eq!(config.retrain_threshold, 100);
        assert_eq!(config.startup_retry(), Duration::from_secs(1));
        assert_eq!(config.on_rejected, RejectedCandidatePolicy::WarmStart);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "continual_learning": true, "epochs": 5, "on_rejected": "reset_to_serving" }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert!(config.continual_learning);
        assert_eq!(config.epochs, 5);
        assert_eq!(config.retrain_threshold, 100);
        assert_eq!(config.on_rejected, RejectedCandidatePolicy::ResetToServing);
    }

    #[test]
    fn test_bad_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(PipelineConfig::from_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            PipelineConfig::from_file(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = PipelineConfig { retrain_threshold: 0, ..PipelineConfig::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "retrain_threshold", .. })
        ));
    }

    #[test]
    fn test_artifact_layout() {
        let paths = ArtifactPaths::under(Path::new("/data"));
        assert_eq!(paths.serving_model, Path::new("/data/inference_artifacts/inference.onnx"));
        assert_eq!(paths.checkpoint, Path::new("/data/training_artifacts/checkpoint"));
        assert_eq!(paths.output_dir, Path::new("/data/promoted"));
    }
}
