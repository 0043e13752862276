//! Benchmark blob loader
//!
//! Layout (all little-endian):
//! `[count: i32][dim1: i32][dim2: i32][labels_present: i32]`
//! then `count * dim1 * dim2` f32 values, then `count` i32 labels when
//! `labels_present == 1`.

use std::fs;
use std::path::Path;

use crate::constants::{CHANNELS, SAMPLE_LEN, TIMESTEPS};
use crate::logic::signal::Sample;
use super::DatasetError;

const HEADER_LEN: usize = 16;

/// Read-only labelled dataset used for validation and replay
#[derive(Debug, Clone)]
pub struct ValidationSet {
    samples: Vec<Sample>,
}

impl ValidationSet {
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let bytes = fs::read(path)?;
        let set = Self::from_bytes(&bytes)?;
        log::info!(
            "Loaded {} samples ({} labelled) from {}",
            set.len(),
            set.labeled_count(),
            path.display()
        );
        Ok(set)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatasetError> {
        if bytes.len() < HEADER_LEN {
            return Err(DatasetError::Truncated {
                section: "header",
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let header: Vec<i32> = bytes[..HEADER_LEN]
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let (count, dim1, dim2, labels_present) = (header[0], header[1], header[2], header[3]);

        if count < 0 || dim1 <= 0 || dim2 <= 0 {
            return Err(DatasetError::InvalidHeader(format!(
                "count={}, dim1={}, dim2={}",
                count, dim1, dim2
            )));
        }
        let count = count as usize;
        let window = dim1 as usize * dim2 as usize;
        if window != SAMPLE_LEN {
            return Err(DatasetError::InvalidHeader(format!(
                "window {}x{} does not match {}x{}",
                dim1, dim2, CHANNELS, TIMESTEPS
            )));
        }

        let data_len = count * window * 4;
        let data = slice(bytes, HEADER_LEN, data_len, "data")?;

        let labels: Vec<i32> = if labels_present == 1 {
            slice(bytes, HEADER_LEN + data_len, count * 4, "labels")?
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        } else {
            vec![Sample::UNLABELED; count]
        };

        let samples = data
            .chunks_exact(window * 4)
            .zip(labels)
            .map(|(chunk, label)| {
                let values = chunk
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                Sample::new(values, label)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { samples })
    }

    /// Serialize back into the blob layout (labels always included)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.samples.len() * (SAMPLE_LEN + 1) * 4);
        for field in [self.samples.len() as i32, CHANNELS as i32, TIMESTEPS as i32, 1] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        for sample in &self.samples {
            for value in sample.data() {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        for sample in &self.samples {
            out.extend_from_slice(&sample.label().to_le_bytes());
        }
        out
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn labeled_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_labeled()).count()
    }
}

fn slice<'a>(
    bytes: &'a [u8],
    start: usize,
    len: usize,
    section: &'static str,
) -> Result<&'a [u8], DatasetError> {
    let available = bytes.len().saturating_sub(start);
    if available < len {
        return Err(DatasetError::Truncated {
            section,
            expected: len,
            actual: available,
        });
    }
    Ok(&bytes[start..start + len])
}
