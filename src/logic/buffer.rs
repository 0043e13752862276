//! Sample Buffer - Retrain Trigger
//!
//! Collects recent samples and decides when a retraining cycle is due.
//! Owned by the orchestrator, always accessed under its lock.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RETRAIN_THRESHOLD;
use crate::logic::signal::Sample;

/// Result of offering a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Appended, no action needed
    Buffered,
    /// Dropped because a training cycle holds the buffer
    Ignored,
    /// Appended and the retrain threshold is met
    RetrainDue,
}

/// Buffer status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferStatus {
    pub current_size: usize,
    pub required_size: usize,
    pub is_ready: bool,
    pub is_paused: bool,
    pub fill_percent: f32,
}

pub struct SampleBuffer {
    samples: Vec<Sample>,
    threshold: usize,
    paused: bool,
}

impl SampleBuffer {
    pub fn new(threshold: usize) -> Self {
        // Thresholds come from config; preallocate no more than the default
        Self {
            samples: Vec::with_capacity(threshold.min(DEFAULT_RETRAIN_THRESHOLD)),
            threshold,
            paused: false,
        }
    }

    /// Append unless paused. Retraining is only signalled when continual
    /// learning is enabled; otherwise the buffer just keeps growing.
    pub fn offer(&mut self, sample: Sample, learning_enabled: bool) -> Offer {
        if self.paused {
            return Offer::Ignored;
        }

        self.samples.push(sample);
        log::debug!("Collected {} samples", self.samples.len());

        if learning_enabled && self.samples.len() >= self.threshold {
            Offer::RetrainDue
        } else {
            Offer::Buffered
        }
    }

    /// Pause, shuffle and drain the buffer for a training cycle.
    /// The buffer stays empty and paused until `resume`.
    pub fn take_for_training<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Sample> {
        self.paused = true;
        let mut batch = std::mem::take(&mut self.samples);
        batch.shuffle(rng);
        batch
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn status(&self) -> BufferStatus {
        let len = self.samples.len();
        BufferStatus {
            current_size: len,
            required_size: self.threshold,
            is_ready: len >= self.threshold,
            is_paused: self.paused,
            fill_percent: if self.threshold > 0 {
                (len as f32 / self.threshold as f32 * 100.0).min(100.0)
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SAMPLE_LEN;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample(id: usize) -> Sample {
        let mut data = vec![0.0; SAMPLE_LEN];
        data[0] = id as f32;
        Sample::new(data, (id % 2) as i32).unwrap()
    }

    #[test]
    fn test_trigger_on_threshold() {
        let mut buffer = SampleBuffer::new(100);

        for i in 0..99 {
            assert_eq!(buffer.offer(sample(i), true), Offer::Buffered);
        }
        assert_eq!(buffer.offer(sample(99), true), Offer::RetrainDue);

        let mut rng = StdRng::seed_from_u64(1);
        let batch = buffer.take_for_training(&mut rng);
        assert_eq!(batch.len(), 100);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_paused());

        // Paused: nothing is appended, nothing triggers again
        assert_eq!(buffer.offer(sample(100), true), Offer::Ignored);
        assert_eq!(buffer.len(), 0);

        buffer.resume();
        assert_eq!(buffer.offer(sample(101), true), Offer::Buffered);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut buffer = SampleBuffer::new(10);
        for i in 0..50 {
            buffer.offer(sample(i), false);
        }

        let mut rng = StdRng::seed_from_u64(42);
        let batch = buffer.take_for_training(&mut rng);
        let mut ids: Vec<usize> = batch.iter().map(|s| s.data()[0] as usize).collect();
        assert_ne!(ids, (0..50).collect::<Vec<_>>());

        ids.sort_unstable();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_disabled_learning_never_triggers() {
        let mut buffer = SampleBuffer::new(3);
        for i in 0..10 {
            assert_eq!(buffer.offer(sample(i), false), Offer::Buffered);
        }
        assert_eq!(buffer.len(), 10);

        let status = buffer.status();
        assert!(status.is_ready);
        assert_eq!(status.fill_percent, 100.0);
    }

    #[test]
    fn test_huge_threshold_allocates_lazily() {
        let mut buffer = SampleBuffer::new(usize::MAX / 2);
        assert_eq!(buffer.offer(sample(0), true), Offer::Buffered);

        let status = buffer.status();
        assert_eq!(status.current_size, 1);
        assert_eq!(status.required_size, usize::MAX / 2);
        assert!(!status.is_ready);
    }
}
