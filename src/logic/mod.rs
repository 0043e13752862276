//! Logic Module - Pipeline Components
//!
//! - `signal/` - notification decoding and sample assembly
//! - `buffer` - sample collection and retrain trigger
//! - `dataset/` - validation blob, replay source, promotion history
//! - `model/` - serving/trainable models, validation, promotion
//! - `pipeline/` - the orchestrator tying it together

pub mod buffer;
pub mod config;
pub mod dataset;
pub mod events;
pub mod model;
pub mod pipeline;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;
