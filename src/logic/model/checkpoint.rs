//! Checkpoints & Artifact Layout
//!
//! A model slot is either serving (frozen weights) or training (weights
//! plus optimizer state). Promotion moves a candidate into a new
//! generation of files; older generations are never rewritten.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Location and generation of a serialized model state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    pub path: PathBuf,
    pub generation: u64,
}

impl CheckpointRef {
    pub fn new(path: impl Into<PathBuf>, generation: u64) -> Self {
        Self {
            path: path.into(),
            generation,
        }
    }
}

/// Optimizer bookkeeping of the trainable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub optimizer_model: PathBuf,
    pub steps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    Serving(CheckpointRef),
    Training(CheckpointRef, OptimizerState),
}

impl Checkpoint {
    pub fn reference(&self) -> &CheckpointRef {
        match self {
            Checkpoint::Serving(r) | Checkpoint::Training(r, _) => r,
        }
    }

    pub fn generation(&self) -> u64 {
        self.reference().generation
    }

    pub fn is_serving(&self) -> bool {
        matches!(self, Checkpoint::Serving(_))
    }

    pub fn optimizer(&self) -> Option<&OptimizerState> {
        match self {
            Checkpoint::Training(_, opt) => Some(opt),
            Checkpoint::Serving(_) => None,
        }
    }
}

// ============================================================================
// ARTIFACT LAYOUT
// ============================================================================

const CANDIDATE_MODEL: &str = "candidate_model.onnx";
const CANDIDATE_CHECKPOINT: &str = "candidate_checkpoint";

/// File names under the output directory
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    pub fn candidate_model(&self) -> PathBuf {
        self.dir.join(CANDIDATE_MODEL)
    }

    pub fn candidate_checkpoint(&self) -> PathBuf {
        self.dir.join(CANDIDATE_CHECKPOINT)
    }

    pub fn promoted_model(&self, generation: u64) -> PathBuf {
        self.dir.join(format!("serving_g{}.onnx", generation))
    }

    pub fn promoted_checkpoint(&self, generation: u64) -> PathBuf {
        self.dir.join(format!("checkpoint_g{}", generation))
    }

    /// Highest generation with both promoted files present
    pub fn latest_generation(&self) -> Option<u64> {
        let entries = fs::read_dir(&self.dir).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                name.strip_prefix("serving_g")?
                    .strip_suffix(".onnx")?
                    .parse::<u64>()
                    .ok()
            })
            .filter(|&g| self.promoted_checkpoint(g).exists())
            .max()
    }

    /// Move the candidate pair into `generation`. Either both files move
    /// or neither does.
    pub fn commit_candidate(&self, generation: u64) -> io::Result<(PathBuf, PathBuf)> {
        let model = self.promoted_model(generation);
        let checkpoint = self.promoted_checkpoint(generation);

        fs::rename(self.candidate_checkpoint(), &checkpoint)?;
        if let Err(e) = fs::rename(self.candidate_model(), &model) {
            let _ = fs::rename(&checkpoint, self.candidate_checkpoint());
            return Err(e);
        }

        Ok((model, checkpoint))
    }

    /// Remove leftover candidate files (missing files are fine)
    pub fn discard_candidate(&self) {
        for path in [self.candidate_model(), self.candidate_checkpoint()] {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = result {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// SHA-256 of a file, hex encoded
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
