//! Validation Metrics
//!
//! Confusion counts over a labelled set and the scores derived from them.
//! F1 is the promotion criterion.

use serde::{Deserialize, Serialize};

use crate::logic::signal::Sample;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
}

impl ConfusionMatrix {
    /// Count one prediction. Rows where either side is not a binary class
    /// (unlabelled truth, failed prediction) are skipped; returns whether
    /// the row was counted.
    pub fn record(&mut self, truth: i32, prediction: i32) -> bool {
        match (truth, prediction) {
            (Sample::SEIZURE, Sample::SEIZURE) => self.tp += 1,
            (Sample::NO_SEIZURE, Sample::NO_SEIZURE) => self.tn += 1,
            (Sample::NO_SEIZURE, Sample::SEIZURE) => self.fp += 1,
            (Sample::SEIZURE, Sample::NO_SEIZURE) => self.fn_ += 1,
            _ => return false,
        }
        true
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }
}

/// Scores in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub false_positive_rate: f64,
}

impl Metrics {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };

        let precision = ratio(cm.tp, cm.tp + cm.fp);
        let recall = ratio(cm.tp, cm.tp + cm.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(cm.tp + cm.tn, cm.total()),
            precision,
            recall,
            f1,
            false_positive_rate: ratio(cm.fp, cm.fp + cm.tn),
        }
    }

    /// Strict improvement on F1
    pub fn improves_on(&self, other: &Metrics) -> bool {
        self.f1 > other.f1
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acc={:.3} prec={:.3} rec={:.3} f1={:.3} fpr={:.3}",
            self.accuracy, self.precision, self.recall, self.f1, self.false_positive_rate
        )
    }
}
