//! Seizure Guard Core
//!
//! On-device continual-learning inference: sensor notifications are
//! assembled into samples, classified by a frozen serving model, and
//! periodically used to retrain a candidate that is promoted only when it
//! improves F1 on a held-out validation set.

pub mod constants;
pub mod logic;
