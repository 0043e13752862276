//! Central Configuration Constants
//!
//! Single source of truth for signal geometry and pipeline defaults.
//! Environment overrides are read through the helpers at the bottom.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// SIGNAL GEOMETRY
// ============================================================================

/// Timesteps in one inference window
pub const TIMESTEPS: usize = 1024;

/// Sensor channels per timestep
pub const CHANNELS: usize = 18;

/// Floats in one Sample (1024 timesteps x 18 channels)
pub const SAMPLE_LEN: usize = TIMESTEPS * CHANNELS;

/// Floats the sensor firmware packs into one notification (4 timesteps)
pub const FLOATS_PER_NOTIFICATION: usize = CHANNELS * 4;

// ============================================================================
// PIPELINE DEFAULTS
// ============================================================================

/// Buffered samples needed before a retraining cycle starts
pub const DEFAULT_RETRAIN_THRESHOLD: usize = 100;

/// Training epochs per retraining cycle
pub const DEFAULT_EPOCHS: usize = 20;

/// Interval between model manager readiness polls (milliseconds)
pub const DEFAULT_STARTUP_RETRY_MS: u64 = 1000;

/// Interval between replayed samples (milliseconds)
pub const DEFAULT_REPLAY_INTERVAL_MS: u64 = 4000;

/// Capacity of the pipeline event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Seizure Guard";

/// Directory name under the platform data dir
pub const DATA_DIR_NAME: &str = "seizure-guard";

// ============================================================================
// ENVIRONMENT
// ============================================================================

pub const ENV_CONFIG_PATH: &str = "SEIZURE_GUARD_CONFIG";
pub const ENV_DATA_DIR: &str = "SEIZURE_GUARD_DATA_DIR";
pub const ENV_CONTINUAL_LEARNING: &str = "SEIZURE_GUARD_CONTINUAL_LEARNING";
pub const ENV_EPOCHS: &str = "SEIZURE_GUARD_EPOCHS";
pub const ENV_RETRAIN_THRESHOLD: &str = "SEIZURE_GUARD_RETRAIN_THRESHOLD";
pub const ENV_STARTUP_RETRY_MS: &str = "SEIZURE_GUARD_STARTUP_RETRY_MS";
pub const ENV_REPLAY: &str = "SEIZURE_GUARD_REPLAY";
pub const ENV_REPLAY_INTERVAL_MS: &str = "SEIZURE_GUARD_REPLAY_INTERVAL_MS";
pub const ENV_REPLAY_SHUFFLE: &str = "SEIZURE_GUARD_REPLAY_SHUFFLE";

/// Base directory for artifacts, promoted models and history
pub fn get_data_dir() -> PathBuf {
    std::env::var(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DATA_DIR_NAME)
        })
}

/// Optional JSON config file
pub fn get_config_path() -> Option<PathBuf> {
    std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from)
}

/// Benchmark blob to replay through the pipeline instead of a live sensor
pub fn get_replay_path() -> Option<PathBuf> {
    std::env::var(ENV_REPLAY).ok().map(PathBuf::from)
}

/// Interval between replayed samples
pub fn get_replay_interval() -> Duration {
    Duration::from_millis(env_parse(ENV_REPLAY_INTERVAL_MS).unwrap_or(DEFAULT_REPLAY_INTERVAL_MS))
}

/// Whether replayed samples play in random order
pub fn get_replay_shuffle() -> bool {
    env_flag(ENV_REPLAY_SHUFFLE).unwrap_or(false)
}

/// Parse an environment variable, `None` when unset or unparsable
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Boolean flag: anything except "false"/"0" counts as enabled
pub fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| s.to_lowercase() != "false" && s != "0")
}
