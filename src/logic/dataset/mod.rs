//! Dataset Module - Benchmark Data, Replay & Promotion History
//!
//! - `loader`: the labelled benchmark blob used for promotion decisions
//! - `replay`: re-emits a blob as sensor notifications (no hardware needed)
//! - `record`/`writer`: append-only JSONL log of every promotion decision

pub mod loader;
pub mod record;
pub mod replay;
pub mod writer;

#[cfg(test)]
mod tests;

pub use loader::ValidationSet;
pub use record::PromotionRecord;
pub use replay::ReplaySource;
pub use writer::HistoryWriter;

use thiserror::Error;

use crate::logic::signal::SignalError;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("truncated {section}: expected {expected} bytes, got {actual}")]
    Truncated {
        section: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid sample: {0}")]
    Sample(#[from] SignalError),
}
