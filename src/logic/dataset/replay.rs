//! Replay Source
//!
//! Plays benchmark samples back as sensor notifications, packed the way
//! the wearable's firmware packs them (72 floats per notification).
//! Labels do not travel over the link, so replayed samples arrive unlabeled.

use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::constants::FLOATS_PER_NOTIFICATION;
use crate::logic::signal::{encode_floats, Sample};
use super::{DatasetError, ValidationSet};

pub struct ReplaySource {
    samples: Vec<Sample>,
    floats_per_notification: usize,
}

impl ReplaySource {
    pub fn new(set: ValidationSet) -> Self {
        Self {
            samples: set.into_samples(),
            floats_per_notification: FLOATS_PER_NOTIFICATION,
        }
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        Ok(Self::new(ValidationSet::load(path)?))
    }

    /// Random playback order, each sample played once
    pub fn shuffled<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        self.samples.shuffle(rng);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Notifications carrying one sample
    pub fn packets(&self, index: usize) -> Vec<Vec<u8>> {
        self.samples
            .get(index)
            .map(|sample| {
                sample
                    .data()
                    .chunks(self.floats_per_notification)
                    .map(encode_floats)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every notification, sample after sample
    pub fn notifications(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        (0..self.samples.len()).flat_map(move |i| self.packets(i))
    }
}
