use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::model::Metrics;

/// One line of the promotion history
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PromotionRecord {
    pub cycle_id: Uuid,
    pub timestamp: DateTime<Utc>,

    // Training input
    pub samples: usize,
    pub epochs: usize,

    // Validation before and after
    pub current: Metrics,
    pub candidate: Metrics,

    // Decision
    pub promoted: bool,
    pub generation: u64,
    pub artifact_sha256: Option<String>,
}
