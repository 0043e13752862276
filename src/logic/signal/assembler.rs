//! Signal Batching Assembler
//!
//! Accumulates little-endian floats from variable-length notifications
//! into a fixed window of `SAMPLE_LEN` values.
//!
//! Overflow policy: a value arriving while the window is already full
//! restarts the window at index 0. The in-progress batch is lost, the
//! incoming values are kept. Completion is checked once per notification,
//! after all of its values have been appended, so a notification that
//! straddles a window boundary overflows instead of emitting.

use serde::{Deserialize, Serialize};

use crate::constants::SAMPLE_LEN;
use super::{Sample, SignalError};

// ============================================================================
// WIRE FORMAT
// ============================================================================

/// Decode complete little-endian f32 values. Trailing bytes that do not
/// form a whole float are ignored.
pub fn decode_floats(payload: &[u8]) -> Result<Vec<f32>, SignalError> {
    if payload.is_empty() {
        return Err(SignalError::Empty);
    }
    if payload.len() < 4 {
        return Err(SignalError::TooShort(payload.len()));
    }

    Ok(payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Encode values the way the sensor firmware sends them
pub fn encode_floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Assembler diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblerStats {
    pub notifications: u64,
    pub malformed: u64,
    pub overflows: u64,
    pub emitted: u64,
}

pub struct SignalAssembler {
    window: Vec<f32>,
    cursor: usize,
    stats: AssemblerStats,
}

impl SignalAssembler {
    pub fn new() -> Self {
        Self {
            window: vec![0.0; SAMPLE_LEN],
            cursor: 0,
            stats: AssemblerStats::default(),
        }
    }

    /// Feed one notification. Returns a Sample when the window is complete.
    pub fn on_notification(&mut self, payload: &[u8]) -> Option<Sample> {
        self.stats.notifications += 1;

        let values = match decode_floats(payload) {
            Ok(values) => values,
            Err(e) => {
                self.stats.malformed += 1;
                log::warn!("Dropping notification: {}", e);
                return None;
            }
        };

        for value in values {
            if self.cursor >= SAMPLE_LEN {
                self.stats.overflows += 1;
                log::warn!("Sample window overflow, discarding in-progress batch");
                self.cursor = 0;
            }
            self.window[self.cursor] = value;
            self.cursor += 1;
        }

        if self.cursor != SAMPLE_LEN {
            return None;
        }

        self.cursor = 0;
        match Sample::unlabeled(self.window.clone()) {
            Ok(sample) => {
                self.stats.emitted += 1;
                log::debug!("Sample #{} assembled", self.stats.emitted);
                Some(sample)
            }
            Err(e) => {
                log::error!("Assembled window rejected: {}", e);
                None
            }
        }
    }

    /// Write position inside the current window
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Values currently held in the in-progress window
    pub fn pending(&self) -> &[f32] {
        &self.window[..self.cursor]
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Drop any partial window
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl Default for SignalAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FLOATS_PER_NOTIFICATION;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut payload = encode_floats(&[1.5, -2.0]);
        payload.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        assert_eq!(decode_floats(&payload).unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_malformed_payloads_emit_nothing() {
        let mut assembler = SignalAssembler::new();

        assert!(assembler.on_notification(&[]).is_none());
        assert!(assembler.on_notification(&[1, 2, 3]).is_none());

        let stats = assembler.stats();
        assert_eq!(stats.malformed, 2);
        assert_eq!(assembler.cursor(), 0);
    }

    #[test]
    fn test_firmware_sized_notifications() {
        let mut assembler = SignalAssembler::new();
        let total = ramp(0, SAMPLE_LEN * 3);
        let mut emitted = Vec::new();

        for chunk in total.chunks(FLOATS_PER_NOTIFICATION) {
            if let Some(sample) = assembler.on_notification(&encode_floats(chunk)) {
                emitted.push(sample);
            }
        }

        assert_eq!(emitted.len(), 3);
        for (i, sample) in emitted.iter().enumerate() {
            assert_eq!(sample.data(), &total[i * SAMPLE_LEN..(i + 1) * SAMPLE_LEN]);
            assert_eq!(sample.label(), Sample::UNLABELED);
        }
        assert_eq!(assembler.cursor(), 0);
    }

    #[test]
    fn test_mixed_sizes_on_window_boundaries() {
        let mut assembler = SignalAssembler::new();
        let values = ramp(0, SAMPLE_LEN * 2);
        // Uneven split inside each window, aligned at the window edge
        let cuts = [0, 5000, 5001, 18000, SAMPLE_LEN, SAMPLE_LEN * 2];
        let mut count = 0;

        for pair in cuts.windows(2) {
            let chunk = &values[pair[0]..pair[1]];
            if let Some(sample) = assembler.on_notification(&encode_floats(chunk)) {
                assert_eq!(sample.data(), &values[count * SAMPLE_LEN..(count + 1) * SAMPLE_LEN]);
                count += 1;
            }
        }

        assert_eq!(count, 2);
    }

    #[test]
    fn test_overflow_keeps_only_remainder() {
        let mut assembler = SignalAssembler::new();
        assert!(assembler.on_notification(&encode_floats(&ramp(0, 18000))).is_none());
        assert_eq!(assembler.cursor(), 18000);

        // 432 values complete the window, the remaining 68 overflow
        let crossing = ramp(100_000, 500);
        assert!(assembler.on_notification(&encode_floats(&crossing)).is_none());

        assert_eq!(assembler.cursor(), 68);
        assert_eq!(assembler.pending(), &crossing[432..]);
        assert_eq!(assembler.stats().overflows, 1);

        // The next full window starts with the overflow remainder
        let rest = ramp(200_000, SAMPLE_LEN - 68);
        let sample = assembler.on_notification(&encode_floats(&rest)).unwrap();
        assert_eq!(&sample.data()[..68], &crossing[432..]);
        assert_eq!(&sample.data()[68..], &rest[..]);
    }
}
