//! Quality assessor
//!
//! Combines per-modality quality metrics into one composite score per
//! capture and applies the two-part acceptance rule:
//!
//! 1. composite score >= acceptance threshold, AND
//! 2. no required modality is missing or failed.
//!
//! The composite is a weighted sum of per-modality scalar summaries divided
//! by the summed weights of the modalities that actually succeeded — failed
//! and absent modalities contribute to neither numerator nor denominator. A
//! required modality that is missing or failed forces `Rejected` regardless
//! of score; a high composite never compensates for a missing mandatory
//! sensor stream.
//!
//! Assessment is a pure function of the metrics present at assessment time
//! and the weighting policy; completion order never matters.

use crate::config::{ProcessingConfig, WeightingPolicy};
use crate::types::{
    CaptureId, Decision, ModalityKind, ModalityResult, QualityMetrics,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Quality assessment errors
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// Metric dimensions out of range (must be within [0,1])
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Quality assessor for one batch run
///
/// Captures the weighting policy, required-modality set, and acceptance
/// threshold from the run configuration; immutable for the run's duration.
pub struct QualityAssessor {
    weighting: WeightingPolicy,
    required: BTreeSet<ModalityKind>,
    acceptance_threshold: f64,
}

impl QualityAssessor {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            weighting: config.weighting.clone(),
            required: config.required.clone(),
            acceptance_threshold: config.acceptance_threshold,
        }
    }

    /// Assess one capture from its complete per-modality outcome set
    ///
    /// Expects one `ModalityResult` per modality kind (Skipped for absent
    /// modalities); the scheduler waits for all outcomes before calling.
    ///
    /// # Errors
    /// Returns `AssessmentError::InvalidInput` if a successful modality
    /// carries a metric dimension outside [0,1].
    pub fn assess(
        &self,
        capture_id: &CaptureId,
        results: &[ModalityResult],
    ) -> Result<QualityMetrics, AssessmentError> {
        let mut modality_metrics = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for result in results {
            if let Some(metrics) = result.outcome.metrics() {
                metrics.validate().map_err(|e| {
                    AssessmentError::InvalidInput(format!(
                        "{} modality of capture {}: {}",
                        result.modality, capture_id, e
                    ))
                })?;

                let weight = self.weighting.weight_for(result.modality);
                weighted_sum += weight * metrics.summary();
                weight_total += weight;
                modality_metrics.insert(result.modality, metrics.clone());
            }
        }

        let composite_score = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let required_satisfied = self.required.iter().all(|kind| {
            results
                .iter()
                .any(|r| r.modality == *kind && r.outcome.is_success())
        });

        let decision = if required_satisfied && composite_score >= self.acceptance_threshold {
            Decision::Accepted
        } else {
            Decision::Rejected
        };

        Ok(QualityMetrics {
            capture_id: capture_id.clone(),
            modality_metrics,
            composite_score,
            decision,
        })
    }
}
