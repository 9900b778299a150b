//! Per-capture worker
//!
//! Processes one capture to a terminal state: appends the InProgress
//! checkpoint, runs every present modality concurrently with per-attempt
//! timeout and retry, derives the quality decision once all outcomes are in,
//! and appends the terminal checkpoint. One modality's failure never aborts
//! its siblings; a failure of the capture never aborts the run.
//!
//! The only error this returns is a checkpoint store failure — that is
//! fatal to the run because resumability can no longer be guaranteed.

use crate::db::checkpoints;
use crate::processors::{ProcessingError, ProcessorRegistry};
use crate::quality::QualityAssessor;
use crate::scheduler::statistics::BatchStatistics;
use crate::types::{
    CaptureManifestEntry, CheckpointRecord, Decision, ModalityKind, ModalityOutcome,
    ModalityResult, ProcessingErrorKind, RawDataRef,
};
use crate::RunContext;
use futures::stream::{FuturesUnordered, StreamExt};
use kova_common::events::{CaptureOutcomeSummary, KovaEvent, ModalityOutcomeKind};
use std::sync::Arc;
use std::time::Duration;

/// Process one capture to a terminal checkpoint record
pub(super) async fn process_capture(
    ctx: RunContext,
    registry: ProcessorRegistry,
    stats: Arc<BatchStatistics>,
    entry: CaptureManifestEntry,
    attempt: u32,
) -> kova_common::Result<()> {
    let capture_id = entry.capture_id.clone();

    checkpoints::append_record(
        &ctx.db,
        &CheckpointRecord::in_progress(capture_id.clone(), attempt),
    )
    .await?;

    stats.record_started();
    ctx.event_bus.emit_lossy(KovaEvent::CaptureStarted {
        capture_id: capture_id.to_string(),
        attempt,
        timestamp: chrono::Utc::now(),
    });

    tracing::debug!(
        capture_id = %capture_id,
        attempt,
        modalities = entry.modalities.len(),
        "Capture admitted"
    );

    // Invalid raw-data references at dispatch time short-cut the capture to
    // PermanentlyFailed without consuming retries
    let mut missing = Vec::new();
    for raw in entry.modalities.values() {
        if !raw.path.exists() {
            missing.push(ModalityResult {
                modality: raw.modality,
                outcome: ModalityOutcome::Failed {
                    kind: ProcessingErrorKind::InvalidInput,
                    detail: format!("raw data reference missing: {}", raw.path.display()),
                },
                attempts: 0,
            });
        }
    }
    if !missing.is_empty() {
        let reason = format!(
            "invalid raw data reference for {} of {} modalities",
            missing.len(),
            entry.modalities.len()
        );
        tracing::warn!(capture_id = %capture_id, %reason, "Capture permanently failed at dispatch");

        let record = CheckpointRecord::permanently_failed(capture_id.clone(), attempt, missing);
        checkpoints::append_record(&ctx.db, &record).await?;
        stats.record_permanently_failed();
        ctx.event_bus.emit_lossy(KovaEvent::CapturePermanentlyFailed {
            capture_id: capture_id.to_string(),
            reason,
            timestamp: chrono::Utc::now(),
        });
        return Ok(());
    }

    // Present modalities run concurrently; order of completion is free
    let mut futures = FuturesUnordered::new();
    for raw in entry.modalities.values().cloned() {
        let registry = registry.clone();
        let retry_limit = ctx.config.retry_limit;
        let timeout = ctx.config.modality_timeout();
        futures.push(async move {
            process_modality(&registry, raw, retry_limit, timeout).await
        });
    }

    let mut results: Vec<ModalityResult> = Vec::with_capacity(ModalityKind::ALL.len());
    while let Some(result) = futures.next().await {
        results.push(result);
    }

    // Absent modalities are Skipped, never retried
    for kind in ModalityKind::ALL {
        if !entry.has_modality(kind) {
            results.push(ModalityResult {
                modality: kind,
                outcome: ModalityOutcome::Skipped,
                attempts: 0,
            });
        }
    }
    results.sort_by_key(|r| r.modality);

    // A required modality that was present but exhausted its retries means
    // processing could not complete
    let failed_required: Vec<ModalityKind> = results
        .iter()
        .filter(|r| {
            ctx.config.is_required(r.modality)
                && entry.has_modality(r.modality)
                && r.outcome.is_failed()
        })
        .map(|r| r.modality)
        .collect();

    if !failed_required.is_empty() {
        let reason = format!(
            "required modality exhausted retries: {}",
            failed_required
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        tracing::warn!(capture_id = %capture_id, %reason, "Capture permanently failed");

        let record = CheckpointRecord::permanently_failed(capture_id.clone(), attempt, results);
        checkpoints::append_record(&ctx.db, &record).await?;
        stats.record_permanently_failed();
        ctx.event_bus.emit_lossy(KovaEvent::CapturePermanentlyFailed {
            capture_id: capture_id.to_string(),
            reason,
            timestamp: chrono::Utc::now(),
        });
        return Ok(());
    }

    // All outcomes are in: derive the quality decision. An assessment error
    // means a processor produced out-of-range metrics; that capture cannot
    // complete, but the run continues.
    let assessor = QualityAssessor::new(&ctx.config);
    let quality = match assessor.assess(&capture_id, &results) {
        Ok(quality) => quality,
        Err(e) => {
            let reason = format!("quality assessment failed: {}", e);
            tracing::warn!(capture_id = %capture_id, %reason, "Capture permanently failed");

            let record =
                CheckpointRecord::permanently_failed(capture_id.clone(), attempt, results);
            checkpoints::append_record(&ctx.db, &record).await?;
            stats.record_permanently_failed();
            ctx.event_bus.emit_lossy(KovaEvent::CapturePermanentlyFailed {
                capture_id: capture_id.to_string(),
                reason,
                timestamp: chrono::Utc::now(),
            });
            return Ok(());
        }
    };

    let accepted = quality.decision == Decision::Accepted;
    let composite_score = quality.composite_score;
    let summaries = outcome_summaries(&results);

    tracing::info!(
        capture_id = %capture_id,
        composite_score,
        decision = quality.decision.as_str(),
        "Capture completed"
    );

    let record = CheckpointRecord::completed(capture_id.clone(), attempt, results, quality);
    checkpoints::append_record(&ctx.db, &record).await?;

    if accepted {
        stats.record_accepted();
    } else {
        stats.record_rejected();
    }
    ctx.event_bus.emit_lossy(KovaEvent::CaptureCompleted {
        capture_id: capture_id.to_string(),
        accepted,
        composite_score,
        modalities: summaries,
        timestamp: chrono::Utc::now(),
    });

    Ok(())
}

/// Process one modality with retry, honoring the per-attempt timeout
///
/// Never returns an error: the final failure is folded into the outcome so
/// sibling modalities keep running.
async fn process_modality(
    registry: &ProcessorRegistry,
    raw: RawDataRef,
    retry_limit: u32,
    timeout: Duration,
) -> ModalityResult {
    let modality = raw.modality;
    let Some(processor) = registry.get(modality) else {
        return ModalityResult {
            modality,
            outcome: ModalityOutcome::Failed {
                kind: ProcessingErrorKind::Internal,
                detail: format!("no processor registered for {}", modality),
            },
            attempts: 0,
        };
    };

    let mut last_error = ProcessingError::Internal("no attempt made".to_string());
    for attempt in 1..=retry_limit {
        match tokio::time::timeout(timeout, processor.process(&raw)).await {
            Ok(Ok((data, metrics))) => {
                return ModalityResult {
                    modality,
                    outcome: ModalityOutcome::Success { data, metrics },
                    attempts: attempt,
                };
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    modality = %modality,
                    path = %raw.path.display(),
                    attempt,
                    retry_limit,
                    error = %e,
                    "Modality processing attempt failed"
                );
                last_error = e;
            }
            Err(_) => {
                tracing::warn!(
                    modality = %modality,
                    path = %raw.path.display(),
                    attempt,
                    retry_limit,
                    timeout_secs = timeout.as_secs(),
                    "Modality processing attempt timed out"
                );
                last_error = ProcessingError::Timeout(timeout);
            }
        }
    }

    ModalityResult {
        modality,
        outcome: ModalityOutcome::Failed {
            kind: last_error.kind(),
            detail: last_error.to_string(),
        },
        attempts: retry_limit,
    }
}

/// Condense modality results for event payloads
fn outcome_summaries(results: &[ModalityResult]) -> Vec<CaptureOutcomeSummary> {
    results
        .iter()
        .map(|r| CaptureOutcomeSummary {
            modality: r.modality.as_str().to_string(),
            outcome: match &r.outcome {
                ModalityOutcome::Success { .. } => ModalityOutcomeKind::Success,
                ModalityOutcome::Failed { .. } => ModalityOutcomeKind::Failed,
                ModalityOutcome::Skipped => ModalityOutcomeKind::Skipped,
            },
            attempts: r.attempts,
            score: r.outcome.metrics().map(|m| m.summary()),
        })
        .collect()
}
