//! Signal Module - Sensor Link Decoding
//!
//! Turns raw notification payloads from the wearable into fixed-size
//! Samples the classifier can consume.

pub mod assembler;
pub mod sample;

pub use assembler::{decode_floats, encode_floats, AssemblerStats, SignalAssembler};
pub use sample::Sample;

use thiserror::Error;

/// Protocol errors on the sensor link
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("empty notification payload")]
    Empty,

    #[error("payload too short: {0} bytes, need at least one 4-byte float")]
    TooShort(usize),

    #[error("sample must hold {expected} floats, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}
