//! Integration tests for resume and shutdown semantics
//!
//! A run interrupted mid-capture leaves a latest-InProgress checkpoint
//! record; the next run must re-attempt exactly those captures, skip
//! already-terminal ones, and never double-count anything in the final
//! report. Graceful cancellation drains in-flight captures to a terminal
//! state.

mod helpers;

use helpers::{run_context, write_capture, MockProcessor};
use kova_batch::config::ProcessingConfig;
use kova_batch::db::checkpoints;
use kova_batch::processors::ProcessorRegistry;
use kova_batch::scheduler::BatchScheduler;
use kova_batch::types::{
    CaptureId, CaptureState, CheckpointRecord, Decision, ModalityKind, ModalityMetrics,
    ModalityOutcome, ModalityResult, ProcessedData, QualityMetrics,
};
use kova_common::events::KovaEvent;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn completed_record(name: &str) -> CheckpointRecord {
    let capture_id = CaptureId::new(name);
    let metrics = ModalityMetrics::new().with("quality", 0.9);
    let results = vec![ModalityResult {
        modality: ModalityKind::Image,
        outcome: ModalityOutcome::Success {
            data: ProcessedData {
                modality: ModalityKind::Image,
                bytes_processed: 4,
                attributes: BTreeMap::new(),
            },
            metrics: metrics.clone(),
        },
        attempts: 1,
    }];
    let quality = QualityMetrics {
        capture_id: capture_id.clone(),
        modality_metrics: BTreeMap::from([(ModalityKind::Image, metrics)]),
        composite_score: 0.9,
        decision: Decision::Accepted,
    };
    CheckpointRecord::completed(capture_id, 1, results, quality)
}

#[tokio::test]
async fn test_resume_skips_terminal_and_reattempts_interrupted() {
    let dataset = TempDir::new().unwrap();
    for name in ["capture_0001", "capture_0002", "capture_0003"] {
        write_capture(dataset.path(), name, &[ModalityKind::Image]);
    }

    let mut config = ProcessingConfig::default();
    config.required = BTreeSet::from([ModalityKind::Image]);
    config.acceptance_threshold = 0.5;
    let ctx = run_context(dataset.path(), config.clone()).await;

    // Simulate a previous run: capture_0001 finished, capture_0002 was
    // interrupted mid-flight (hard abort leaves its InProgress record)
    checkpoints::append_record(&ctx.db, &completed_record("capture_0001"))
        .await
        .unwrap();
    checkpoints::append_record(
        &ctx.db,
        &CheckpointRecord::in_progress(CaptureId::new("capture_0002"), 1),
    )
    .await
    .unwrap();

    let image = MockProcessor::new(ModalityKind::Image).with_score(0.9);
    let image_calls = image.calls();
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(image));

    let scheduler = BatchScheduler::new(ctx, registry);
    let report = scheduler
        .run(dataset.path(), CancellationToken::new())
        .await
        .unwrap();

    // Resume-without-redo: the finished capture was not reprocessed
    let calls = image_calls.lock().unwrap();
    assert_eq!(calls.get("capture_0001"), None);
    assert_eq!(calls.get("capture_0002"), Some(&1));
    assert_eq!(calls.get("capture_0003"), Some(&1));
    drop(calls);

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.accepted, 3);
    assert_eq!(report.summary.interrupted, 0);

    // The interrupted capture got a fresh attempt, from scratch
    let reattempted = report
        .captures
        .iter()
        .find(|c| c.capture_id.as_str() == "capture_0002")
        .unwrap();
    assert_eq!(reattempted.state, CaptureState::Completed);
    assert_eq!(reattempted.attempt, 2);

    // Never double-counted: one row per capture
    let ids: HashSet<_> = report
        .captures
        .iter()
        .map(|c| c.capture_id.as_str())
        .collect();
    assert_eq!(ids.len(), report.captures.len());
}

#[tokio::test]
async fn test_resumed_run_supersedes_interrupted_record() {
    let dataset = TempDir::new().unwrap();
    write_capture(dataset.path(), "capture_0001", &[ModalityKind::Image]);

    let mut config = ProcessingConfig::default();
    config.required = BTreeSet::from([ModalityKind::Image]);
    config.acceptance_threshold = 0.5;
    let ctx = run_context(dataset.path(), config.clone()).await;

    checkpoints::append_record(
        &ctx.db,
        &CheckpointRecord::in_progress(CaptureId::new("capture_0001"), 1),
    )
    .await
    .unwrap();

    let db = ctx.db.clone();
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(MockProcessor::new(ModalityKind::Image).with_score(0.9)));

    let scheduler = BatchScheduler::new(ctx, registry);
    scheduler
        .run(dataset.path(), CancellationToken::new())
        .await
        .unwrap();

    // The interrupted record is superseded in place, never merged: the
    // authoritative record is terminal with the partial state discarded
    let latest = checkpoints::latest_record(&db, &CaptureId::new("capture_0001"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.state, CaptureState::Completed);
    assert_eq!(latest.attempt, 2);
    assert!(latest.quality.is_some());
}

#[tokio::test]
async fn test_graceful_cancellation_drains_in_flight() {
    let dataset = TempDir::new().unwrap();
    for i in 1..=40 {
        write_capture(
            dataset.path(),
            &format!("capture_{:04}", i),
            &[ModalityKind::Image],
        );
    }

    let mut config = ProcessingConfig::default();
    config.required = BTreeSet::from([ModalityKind::Image]);
    config.worker_concurrency = 2;
    config.acceptance_threshold = 0.5;
    let ctx = run_context(dataset.path(), config.clone()).await;

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(
        MockProcessor::new(ModalityKind::Image)
            .with_latency(Duration::from_millis(50))
            .with_score(0.9),
    ));

    // Stop the run as soon as the first capture completes
    let cancel_token = CancellationToken::new();
    let trigger = cancel_token.clone();
    let mut events = ctx.event_bus.subscribe();
    let listener = tokio::spawn(async move {
        let mut cancelled_event = false;
        while let Ok(event) = events.recv().await {
            match event {
                KovaEvent::CaptureCompleted { .. } => trigger.cancel(),
                KovaEvent::BatchSessionCancelled { .. } => {
                    cancelled_event = true;
                    break;
                }
                KovaEvent::BatchSessionCompleted { .. } => break,
                _ => {}
            }
        }
        cancelled_event
    });

    let scheduler = BatchScheduler::new(ctx, registry);
    let report = scheduler.run(dataset.path(), cancel_token).await.unwrap();

    // Admission stopped early; whatever was in flight drained to terminal
    assert!(report.summary.total >= 1);
    assert!(
        report.summary.total < 40,
        "cancellation did not stop admission: {} captures processed",
        report.summary.total
    );
    assert_eq!(report.summary.interrupted, 0);
    assert!(report
        .captures
        .iter()
        .all(|c| c.state == CaptureState::Completed));

    let cancelled_event = listener.await.unwrap();
    assert!(cancelled_event, "BatchSessionCancelled was not broadcast");
}
