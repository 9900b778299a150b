//! Batch workflow type definitions
//!
//! Supporting types for batch run progress events.

use serde::{Deserialize, Serialize};

/// High-level phase of a batch run, for progress display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunPhase {
    /// Walking the dataset root, discovering captures
    Enumerating,
    /// Workers processing captures
    Processing,
    /// Draining in-flight captures after a stop signal
    Draining,
    /// Assembling the final report
    Reporting,
}

/// Condensed per-modality outcome kind, for events and report rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalityOutcomeKind {
    /// Processor returned data and metrics
    Success,
    /// Processor failed every allowed attempt
    Failed,
    /// Modality not present in the capture (optional, absent)
    Skipped,
}

/// One modality's outcome within a capture, condensed for event payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOutcomeSummary {
    /// Modality name ("image", "point_cloud", "imu", "gps", "thermal")
    pub modality: String,
    /// Condensed outcome
    pub outcome: ModalityOutcomeKind,
    /// Attempts consumed (0 for Skipped)
    pub attempts: u32,
    /// Scalar summary of the modality's metrics, if it succeeded
    pub score: Option<f64>,
}
