//! Sample - one classification window

use crate::constants::SAMPLE_LEN;
use super::SignalError;

/// One window of sensor data (1024 timesteps x 18 channels) plus a label.
///
/// The data length is checked on construction, so every `Sample` in the
/// pipeline holds exactly `SAMPLE_LEN` floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    data: Vec<f32>,
    label: i32,
}

impl Sample {
    /// Placeholder label for samples without ground truth
    pub const UNLABELED: i32 = -1;
    pub const NO_SEIZURE: i32 = 0;
    pub const SEIZURE: i32 = 1;

    pub fn new(data: Vec<f32>, label: i32) -> Result<Self, SignalError> {
        if data.len() != SAMPLE_LEN {
            return Err(SignalError::WrongLength {
                expected: SAMPLE_LEN,
                actual: data.len(),
            });
        }
        Ok(Self { data, label })
    }

    /// Sample straight off the sensor link (no ground truth yet)
    pub fn unlabeled(data: Vec<f32>) -> Result<Self, SignalError> {
        Self::new(data, Self::UNLABELED)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn label(&self) -> i32 {
        self.label
    }

    pub fn with_label(mut self, label: i32) -> Self {
        self.label = label;
        self
    }

    pub fn is_labeled(&self) -> bool {
        self.label == Self::NO_SEIZURE || self.label == Self::SEIZURE
    }

    /// Class fed to the loss. Unlabeled windows train as "no seizure".
    pub fn training_label(&self) -> i64 {
        if self.label == Self::SEIZURE {
            Self::SEIZURE as i64
        } else {
            Self::NO_SEIZURE as i64
        }
    }
}
