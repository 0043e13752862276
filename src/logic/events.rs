//! Pipeline Events & Application Surface
//!
//! Events are fanned out on a broadcast channel for any number of
//! listeners. Seizure alerts additionally go to the `AppSurface`, which
//! decides between an in-app alert and a persistent notification.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::logic::model::Metrics;

// ============================================================================
// APPLICATION SURFACE
// ============================================================================

/// The surrounding application, as seen by the pipeline
pub trait AppSurface: Send + Sync {
    /// Whether the UI is currently visible
    fn is_foreground(&self) -> bool;

    fn show_seizure_alert(&self);

    fn post_seizure_notification(&self);
}

/// Headless surface: every alert becomes a log line
#[derive(Debug, Default)]
pub struct LogSurface;

impl AppSurface for LogSurface {
    fn is_foreground(&self) -> bool {
        false
    }

    fn show_seizure_alert(&self) {
        log::warn!("SEIZURE DETECTED");
    }

    fn post_seizure_notification(&self) {
        log::warn!("SEIZURE DETECTED (notification)");
    }
}

/// Route a seizure alert by UI visibility
pub fn dispatch_seizure(surface: &dyn AppSurface) {
    if surface.is_foreground() {
        surface.show_seizure_alert();
    } else {
        surface.post_seizure_notification();
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Summary of one retraining cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub samples: usize,
    pub epochs: usize,
    pub current: Metrics,
    pub candidate: Metrics,
    pub promoted: bool,
    /// Generation serving after the cycle
    pub generation: u64,
    pub artifact_sha256: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started,
    Stopped,
    SeizureDetected,
    TrainingStarted { cycle_id: Uuid, samples: usize },
    TrainingFinished(CycleReport),
    TrainingAborted { cycle_id: Uuid, reason: String },
}

/// Broadcast sender; sending without listeners is not an error
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: PipelineEvent) {
        log::debug!("Event: {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}
