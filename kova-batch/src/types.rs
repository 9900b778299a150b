//! Core types for the batch processing engine
//!
//! Defines the data model shared by the enumerator, processors, quality
//! assessor, checkpoint store, and scheduler:
//! - Capture identity and manifest types
//! - Per-modality processing outcomes and metrics
//! - Quality assessment results
//! - Checkpoint records and the per-capture state machine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Capture identity
// ============================================================================

/// Opaque unique identifier for one sensor capture event
///
/// Derived from the capture directory name; unique within a dataset root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureId(String);

impl CaptureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaptureId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Modalities
// ============================================================================

/// Sensor modality (one data channel of a capture)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModalityKind {
    Image,
    PointCloud,
    Imu,
    Gps,
    Thermal,
}

impl ModalityKind {
    /// All modality kinds, in canonical order
    pub const ALL: [ModalityKind; 5] = [
        ModalityKind::Image,
        ModalityKind::PointCloud,
        ModalityKind::Imu,
        ModalityKind::Gps,
        ModalityKind::Thermal,
    ];

    /// Canonical string name, matching the capture index format
    pub fn as_str(&self) -> &'static str {
        match self {
            ModalityKind::Image => "image",
            ModalityKind::PointCloud => "point_cloud",
            ModalityKind::Imu => "imu",
            ModalityKind::Gps => "gps",
            ModalityKind::Thermal => "thermal",
        }
    }
}

impl fmt::Display for ModalityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModalityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ModalityKind::Image),
            "point_cloud" | "pointcloud" => Ok(ModalityKind::PointCloud),
            "imu" => Ok(ModalityKind::Imu),
            "gps" => Ok(ModalityKind::Gps),
            "thermal" => Ok(ModalityKind::Thermal),
            other => Err(format!("Unknown modality: {}", other)),
        }
    }
}

/// Reference to one modality's raw data within a capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataRef {
    /// Modality this data belongs to
    pub modality: ModalityKind,
    /// Absolute path to the raw payload
    pub path: PathBuf,
}

/// One capture's manifest: identity plus the modalities present
///
/// Immutable once enumerated. The modality set never loses members; a
/// modality absent here is Skipped, never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureManifestEntry {
    /// Capture identity (directory name)
    pub capture_id: CaptureId,
    /// Capture directory under the dataset root
    pub capture_dir: PathBuf,
    /// Raw-data references keyed by modality, deterministic order
    pub modalities: BTreeMap<ModalityKind, RawDataRef>,
}

impl CaptureManifestEntry {
    /// Modalities present in this capture, canonical order
    pub fn modality_kinds(&self) -> impl Iterator<Item = ModalityKind> + '_ {
        self.modalities.keys().copied()
    }

    pub fn has_modality(&self, kind: ModalityKind) -> bool {
        self.modalities.contains_key(&kind)
    }
}

// ============================================================================
// Processing outcomes
// ============================================================================

/// Named signal-quality dimensions for one modality, each in [0,1]
///
/// Dimension names are modality-specific ("sharpness", "point_density",
/// "fix_accuracy", ...); the container shape is uniform so the assessor can
/// reduce any modality the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModalityMetrics {
    dimensions: BTreeMap<String, f64>,
}

impl ModalityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a dimension, clamping the value into [0,1]
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.dimensions.insert(name.into(), value.clamp(0.0, 1.0));
    }

    /// Builder-style insert for literal metric construction
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.dimensions.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// Deterministic (name-ordered) iteration over dimensions
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.dimensions.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Reduce to one scalar: mean of dimensions, 0.0 when empty
    pub fn summary(&self) -> f64 {
        if self.dimensions.is_empty() {
            return 0.0;
        }
        self.dimensions.values().sum::<f64>() / self.dimensions.len() as f64
    }

    /// Check every dimension is finite and within [0,1]
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in &self.dimensions {
            if !value.is_finite() || *value < 0.0 || *value > 1.0 {
                return Err(format!("Dimension '{}' out of range: {}", name, value));
            }
        }
        Ok(())
    }
}

/// Error kinds a modality processor can fail with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingErrorKind {
    /// Processor exceeded the caller-supplied deadline
    Timeout,
    /// Raw payload missing, truncated, or malformed
    InvalidInput,
    /// Processor-internal failure
    Internal,
}

impl fmt::Display for ProcessingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingErrorKind::Timeout => f.write_str("timeout"),
            ProcessingErrorKind::InvalidInput => f.write_str("invalid input"),
            ProcessingErrorKind::Internal => f.write_str("internal failure"),
        }
    }
}

/// Summary of a processor's output payload
///
/// Raw processed payload storage is out of scope; what the engine keeps is
/// enough for the report and for downstream curation tooling to locate the
/// source data again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedData {
    /// Modality that produced this data
    pub modality: ModalityKind,
    /// Raw bytes consumed by the processor
    pub bytes_processed: u64,
    /// Processor-specific output attributes (counts, rates, ranges)
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Outcome of processing one (capture, modality) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModalityOutcome {
    /// Processor returned data and metrics
    Success {
        data: ProcessedData,
        metrics: ModalityMetrics,
    },
    /// Processor failed its final allowed attempt
    Failed {
        kind: ProcessingErrorKind,
        detail: String,
    },
    /// Modality absent from the capture (optional, never retried)
    Skipped,
}

impl ModalityOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ModalityOutcome::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ModalityOutcome::Failed { .. })
    }

    /// Metrics, if the outcome carries them
    pub fn metrics(&self) -> Option<&ModalityMetrics> {
        match self {
            ModalityOutcome::Success { metrics, .. } => Some(metrics),
            _ => None,
        }
    }
}

/// One modality's result within a capture attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityResult {
    pub modality: ModalityKind,
    pub outcome: ModalityOutcome,
    /// Processing attempts consumed (0 for Skipped)
    pub attempts: u32,
}

// ============================================================================
// Quality assessment
// ============================================================================

/// Quality gate decision for one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accepted => "Accepted",
            Decision::Rejected => "Rejected",
        }
    }
}

/// Derived quality record for one capture
///
/// Never mutated after creation; a re-assessment produces a new record that
/// supersedes (but does not overwrite) the prior one in the checkpoint store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub capture_id: CaptureId,
    /// Metrics of modalities that succeeded, keyed by modality
    pub modality_metrics: BTreeMap<ModalityKind, ModalityMetrics>,
    /// Weighted composite score in [0,1]
    pub composite_score: f64,
    pub decision: Decision,
}

// ============================================================================
// Checkpoint records
// ============================================================================

/// Per-capture state machine
///
/// `Pending → InProgress → {Completed, PermanentlyFailed}`; the
/// `InProgress → Pending` edge exists only across a resume boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureState {
    Pending,
    InProgress,
    Completed,
    PermanentlyFailed,
}

impl CaptureState {
    /// Terminal states end scheduling for the capture within a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Completed | CaptureState::PermanentlyFailed)
    }
}

/// Durable record of one capture attempt's outcome
///
/// Append-only in the checkpoint store; the latest record per capture is
/// authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub capture_id: CaptureId,
    /// Capture-level attempt number (> 1 after a resume)
    pub attempt: u32,
    pub state: CaptureState,
    /// Per-modality results known at record time
    pub modality_results: Vec<ModalityResult>,
    /// Present exactly when state is Completed
    pub quality: Option<QualityMetrics>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl CheckpointRecord {
    /// Record written when a worker admits the capture
    pub fn in_progress(capture_id: CaptureId, attempt: u32) -> Self {
        Self {
            capture_id,
            attempt,
            state: CaptureState::InProgress,
            modality_results: Vec::new(),
            quality: None,
            recorded_at: chrono::Utc::now(),
        }
    }

    /// Terminal record for a capture that produced a quality decision
    pub fn completed(
        capture_id: CaptureId,
        attempt: u32,
        modality_results: Vec<ModalityResult>,
        quality: QualityMetrics,
    ) -> Self {
        Self {
            capture_id,
            attempt,
            state: CaptureState::Completed,
            modality_results,
            quality: Some(quality),
            recorded_at: chrono::Utc::now(),
        }
    }

    /// Terminal record for a capture processing could not complete
    pub fn permanently_failed(
        capture_id: CaptureId,
        attempt: u32,
        modality_results: Vec<ModalityResult>,
    ) -> Self {
        Self {
            capture_id,
            attempt,
            state: CaptureState::PermanentlyFailed,
            modality_results,
            quality: None,
            recorded_at: chrono::Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modality_kind_round_trip() {
        for kind in ModalityKind::ALL {
            assert_eq!(kind.as_str().parse::<ModalityKind>().unwrap(), kind);
        }
        assert!("lidar".parse::<ModalityKind>().is_err());
    }

    #[test]
    fn test_metrics_summary_is_mean_of_dimensions() {
        let metrics = ModalityMetrics::new()
            .with("sharpness", 0.8)
            .with("exposure", 0.4);
        assert!((metrics.summary() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_summary_empty_is_zero() {
        assert_eq!(ModalityMetrics::new().summary(), 0.0);
    }

    #[test]
    fn test_metrics_insert_clamps_to_unit_interval() {
        let metrics = ModalityMetrics::new().with("noise", 1.7).with("drift", -0.2);
        assert_eq!(metrics.get("noise"), Some(1.0));
        assert_eq!(metrics.get("drift"), Some(0.0));
        assert!(metrics.validate().is_ok());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CaptureState::Pending.is_terminal());
        assert!(!CaptureState::InProgress.is_terminal());
        assert!(CaptureState::Completed.is_terminal());
        assert!(CaptureState::PermanentlyFailed.is_terminal());
    }

    #[test]
    fn test_checkpoint_record_serde_round_trip() {
        let record = CheckpointRecord::in_progress(CaptureId::from("capture_0001"), 2);
        let json = serde_json::to_string(&record).unwrap();
        let back: CheckpointRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.capture_id, record.capture_id);
        assert_eq!(back.attempt, 2);
        assert_eq!(back.state, CaptureState::InProgress);
    }
}
