//! Batch report builder
//!
//! Assembles the final accept/reject manifest from the checkpoint store:
//! one row per capture (latest record is authoritative) plus summary
//! statistics. The JSON form is the machine-readable interface for
//! downstream dataset-curation tooling; `log_summary` gives the operator
//! view.

use crate::db::checkpoints;
use crate::types::{CaptureId, CaptureState, Decision, ModalityKind, ModalityOutcome};
use kova_common::events::ModalityOutcomeKind;
use kova_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

/// Final manifest for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Run session that produced (or finished) this report
    pub session_id: Uuid,
    /// Dataset root the report covers
    pub dataset_root: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub summary: ReportSummary,
    /// Per-capture rows, capture-id order
    pub captures: Vec<CaptureReportEntry>,
}

/// Summary statistics over all captures in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub permanently_failed: usize,
    /// Captures whose latest record is still InProgress (hard abort);
    /// a resumed run re-attempts these
    pub interrupted: usize,
    /// Mean composite score over Completed captures
    pub mean_composite_score: Option<f64>,
}

/// One capture's row in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReportEntry {
    pub capture_id: CaptureId,
    pub state: CaptureState,
    pub attempt: u32,
    /// Quality decision, present for Completed captures
    pub decision: Option<Decision>,
    /// Composite score, present for Completed captures
    pub composite_score: Option<f64>,
    pub modalities: Vec<ModalityReportRow>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// One modality's outcome within a capture row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityReportRow {
    pub modality: ModalityKind,
    pub outcome: ModalityOutcomeKind,
    pub attempts: u32,
    /// Scalar metric summary for successful modalities
    pub score: Option<f64>,
    /// Final error description for failed modalities
    pub error: Option<String>,
}

/// Builds the manifest from the checkpoint store
pub struct ReportBuilder<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Read all latest checkpoint records and assemble the manifest
    pub async fn build(&self, session_id: Uuid, dataset_root: &str) -> Result<BatchReport> {
        let records = checkpoints::all_latest_records(self.pool).await?;

        let mut captures = Vec::with_capacity(records.len());
        let mut accepted = 0;
        let mut rejected = 0;
        let mut permanently_failed = 0;
        let mut interrupted = 0;
        let mut composite_sum = 0.0;
        let mut composite_count = 0usize;

        for record in records {
            match record.state {
                CaptureState::Completed => match record.quality.as_ref().map(|q| q.decision) {
                    Some(Decision::Accepted) => accepted += 1,
                    Some(Decision::Rejected) => rejected += 1,
                    None => {
                        return Err(Error::Internal(format!(
                            "completed capture {} has no quality record",
                            record.capture_id
                        )))
                    }
                },
                CaptureState::PermanentlyFailed => permanently_failed += 1,
                CaptureState::InProgress | CaptureState::Pending => interrupted += 1,
            }

            if let Some(quality) = &record.quality {
                composite_sum += quality.composite_score;
                composite_count += 1;
            }

            let modalities = record
                .modality_results
                .iter()
                .map(|r| ModalityReportRow {
                    modality: r.modality,
                    outcome: match &r.outcome {
                        ModalityOutcome::Success { .. } => ModalityOutcomeKind::Success,
                        ModalityOutcome::Failed { .. } => ModalityOutcomeKind::Failed,
                        ModalityOutcome::Skipped => ModalityOutcomeKind::Skipped,
                    },
                    attempts: r.attempts,
                    score: r.outcome.metrics().map(|m| m.summary()),
                    error: match &r.outcome {
                        ModalityOutcome::Failed { kind, detail } => {
                            Some(format!("{}: {}", kind, detail))
                        }
                        _ => None,
                    },
                })
                .collect();

            captures.push(CaptureReportEntry {
                capture_id: record.capture_id,
                state: record.state,
                attempt: record.attempt,
                decision: record.quality.as_ref().map(|q| q.decision),
                composite_score: record.quality.as_ref().map(|q| q.composite_score),
                modalities,
                recorded_at: record.recorded_at,
            });
        }

        let summary = ReportSummary {
            total: captures.len(),
            accepted,
            rejected,
            permanently_failed,
            interrupted,
            mean_composite_score: if composite_count > 0 {
                Some(composite_sum / composite_count as f64)
            } else {
                None
            },
        };

        Ok(BatchReport {
            session_id,
            dataset_root: dataset_root.to_string(),
            generated_at: chrono::Utc::now(),
            summary,
            captures,
        })
    }
}

impl BatchReport {
    /// Write the machine-readable manifest
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize report: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Log the operator summary
    pub fn log_summary(&self) {
        tracing::info!(
            total = self.summary.total,
            accepted = self.summary.accepted,
            rejected = self.summary.rejected,
            permanently_failed = self.summary.permanently_failed,
            interrupted = self.summary.interrupted,
            mean_composite = self.summary.mean_composite_score.unwrap_or(0.0),
            "Batch report"
        );
    }
}
