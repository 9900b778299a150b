//! Batch scheduler/executor
//!
//! The orchestration core. Capture manifests flow from a spawn-blocking
//! enumerator task through a bounded channel into the dispatcher; the
//! channel bound plus the fixed worker pool implement backpressure, so the
//! enumerator is throttled instead of buffering an arbitrarily large
//! dataset in memory.
//!
//! Per capture the state machine is
//! `Pending → InProgress → {Completed, PermanentlyFailed}`; a capture whose
//! latest checkpoint record is already terminal is skipped on resume, and a
//! latest-InProgress record (an interrupted run) is re-enqueued as a fresh
//! attempt with its partial results discarded.
//!
//! A single capture's failure never aborts the run. The run terminates when
//! the enumerator's sequence is exhausted and all dispatched work reached a
//! terminal state, on explicit cancellation (stop admitting, drain
//! in-flight), or fatally on enumeration/checkpoint-store errors.

pub mod statistics;
mod worker;

use crate::db::{checkpoints, runs};
use crate::enumerator::{CaptureEnumerator, EnumerationError};
use crate::processors::ProcessorRegistry;
use crate::report::{BatchReport, ReportBuilder};
use crate::session::{BatchSession, RunState};
use crate::RunContext;
use anyhow::{Context, Result};
use kova_common::events::{KovaEvent, RunPhase};
use self::statistics::BatchStatistics;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Progress monitor cadence
const PROGRESS_INTERVAL_SECS: u64 = 2;

/// Batch scheduler over a fixed worker pool
pub struct BatchScheduler {
    ctx: RunContext,
    registry: ProcessorRegistry,
}

impl BatchScheduler {
    pub fn new(ctx: RunContext, registry: ProcessorRegistry) -> Self {
        Self { ctx, registry }
    }

    /// Execute one batch run over `dataset_root`
    ///
    /// Resume is implicit: captures whose latest checkpoint record is
    /// terminal are skipped; interrupted captures get a fresh attempt.
    /// `cancel_token` requests graceful shutdown — no new captures are
    /// admitted and in-flight captures drain to a terminal state.
    pub async fn run(
        &self,
        dataset_root: &Path,
        cancel_token: CancellationToken,
    ) -> Result<BatchReport> {
        let start_time = std::time::Instant::now();
        let config = &self.ctx.config;

        let mut session = BatchSession::new(
            dataset_root.display().to_string(),
            (**config).clone(),
        );
        runs::cleanup_stale_runs(&self.ctx.db).await?;
        runs::save_run(&self.ctx.db, &session).await?;

        tracing::info!(
            session_id = %session.session_id,
            dataset_root = %session.dataset_root,
            worker_concurrency = config.worker_concurrency,
            retry_limit = config.retry_limit,
            "Starting batch run"
        );

        self.ctx.event_bus.emit_lossy(KovaEvent::BatchSessionStarted {
            session_id: session.session_id,
            dataset_root: session.dataset_root.clone(),
            timestamp: chrono::Utc::now(),
        });

        let stats = Arc::new(BatchStatistics::new());

        // Enumerator task: walks the dataset, feeding the bounded channel.
        // blocking_send parks the walker whenever the dispatcher is backed
        // up, which is exactly the backpressure contract.
        let (tx, mut rx) =
            mpsc::channel::<Result<crate::types::CaptureManifestEntry, EnumerationError>>(
                config.queue_depth,
            );
        let root = dataset_root.to_path_buf();
        let enumerator_task = tokio::task::spawn_blocking(move || {
            let enumerator = CaptureEnumerator::new();
            let entries = match enumerator.enumerate(&root) {
                Ok(entries) => entries,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            for entry in entries {
                if tx.blocking_send(entry).is_err() {
                    // Receiver dropped: run was cancelled or failed
                    break;
                }
            }
        });

        // Progress monitor task
        let monitor_stop = CancellationToken::new();
        let monitor_task = spawn_progress_monitor(
            self.ctx.clone(),
            session.clone(),
            stats.clone(),
            start_time,
            monitor_stop.clone(),
        );

        // Dispatcher: admit captures while worker slots free up
        let semaphore = Arc::new(Semaphore::new(config.worker_concurrency));
        let mut join_set: JoinSet<kova_common::Result<()>> = JoinSet::new();
        let mut enumeration_error: Option<EnumerationError> = None;
        let mut cancelled = false;

        loop {
            let next = tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::info!(
                        session_id = %session.session_id,
                        "Stop signal received, draining in-flight captures"
                    );
                    cancelled = true;
                    break;
                }
                next = rx.recv() => next,
            };

            match next {
                Some(Ok(entry)) => {
                    stats.record_enumerated();

                    // Resume-without-redo: the checkpoint store is
                    // authoritative for terminal captures
                    let latest = checkpoints::latest_record(&self.ctx.db, &entry.capture_id)
                        .await
                        .context("checkpoint store unreadable")?;

                    let attempt = match latest {
                        Some(record) if record.is_terminal() => {
                            tracing::debug!(
                                capture_id = %entry.capture_id,
                                state = ?record.state,
                                "Skipping capture already terminal in checkpoint store"
                            );
                            stats.record_skipped_prior_terminal();
                            continue;
                        }
                        Some(record) => {
                            // Interrupted in a previous run: fresh attempt,
                            // partial modality results discarded
                            tracing::info!(
                                capture_id = %entry.capture_id,
                                prior_attempt = record.attempt,
                                "Re-attempting capture interrupted by a previous run"
                            );
                            record.attempt + 1
                        }
                        None => 1,
                    };

                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .context("worker pool semaphore closed")?;

                    // A stop signal may have arrived while waiting for the
                    // slot; admit nothing further
                    if cancel_token.is_cancelled() {
                        cancelled = true;
                        drop(permit);
                        break;
                    }

                    let ctx = self.ctx.clone();
                    let registry = self.registry.clone();
                    let stats = stats.clone();
                    join_set.spawn(async move {
                        let result =
                            worker::process_capture(ctx, registry, stats, entry, attempt).await;
                        drop(permit);
                        result
                    });
                }
                Some(Err(e)) => {
                    // Enumeration failure means the dataset cannot be
                    // trusted; fatal to the whole run
                    tracing::error!(error = %e, "Capture enumeration failed");
                    enumeration_error = Some(e);
                    break;
                }
                None => break, // Enumeration exhausted
            }
        }

        // Stop admitting: dropping the receiver unblocks the enumerator
        drop(rx);

        // Drain in-flight captures to a terminal state
        let mut store_error: Option<kova_common::Error> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Checkpoint store failure: resumability is gone, so
                    // finish draining and escalate
                    tracing::error!(error = %e, "Checkpoint write failed");
                    store_error.get_or_insert(e);
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Capture worker panicked");
                    store_error.get_or_insert(kova_common::Error::Internal(format!(
                        "capture worker panicked: {}",
                        join_error
                    )));
                }
            }
        }
        let _ = enumerator_task.await;

        monitor_stop.cancel();
        let _ = monitor_task.await;

        let snapshot = stats.snapshot();
        let duration_seconds = start_time.elapsed().as_secs();

        if let Some(e) = enumeration_error {
            session.transition_to(RunState::Failed);
            session.update_progress(
                snapshot.terminal() + snapshot.skipped_prior_terminal,
                snapshot.enumerated,
                format!("Enumeration failed: {}", e),
            );
            runs::save_run(&self.ctx.db, &session).await?;
            return Err(e).context("capture enumeration failed");
        }

        if let Some(e) = store_error {
            session.transition_to(RunState::Failed);
            runs::save_run(&self.ctx.db, &session).await?;
            return Err(e).context("checkpoint store failure, run not resumable");
        }

        // Assemble the final manifest from the checkpoint store
        let report = ReportBuilder::new(&self.ctx.db)
            .build(session.session_id, &session.dataset_root)
            .await
            .context("failed to build batch report")?;

        if cancelled {
            session.transition_to(RunState::Cancelled);
            session.update_progress(
                snapshot.terminal() + snapshot.skipped_prior_terminal,
                snapshot.enumerated,
                "Batch run cancelled".to_string(),
            );
            runs::save_run(&self.ctx.db, &session).await?;

            tracing::info!(
                session_id = %session.session_id,
                duration_seconds,
                processed = snapshot.terminal(),
                "Batch run cancelled after draining"
            );
            self.ctx.event_bus.emit_lossy(KovaEvent::BatchSessionCancelled {
                session_id: session.session_id,
                captures_processed: snapshot.terminal(),
                timestamp: chrono::Utc::now(),
            });
        } else {
            session.transition_to(RunState::Completed);
            session.update_progress(
                snapshot.terminal() + snapshot.skipped_prior_terminal,
                snapshot.enumerated,
                "Batch run completed".to_string(),
            );
            runs::save_run(&self.ctx.db, &session).await?;

            tracing::info!(
                session_id = %session.session_id,
                duration_seconds,
                enumerated = snapshot.enumerated,
                accepted = snapshot.accepted,
                rejected = snapshot.rejected,
                permanently_failed = snapshot.permanently_failed,
                resumed_skips = snapshot.skipped_prior_terminal,
                "Batch run completed"
            );
            self.ctx.event_bus.emit_lossy(KovaEvent::BatchSessionCompleted {
                session_id: session.session_id,
                captures_processed: snapshot.terminal(),
                accepted: snapshot.accepted,
                rejected: snapshot.rejected,
                permanently_failed: snapshot.permanently_failed,
                duration_seconds,
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(report)
    }
}

/// Periodic progress reporting: rate, ETA, and a progress event
fn spawn_progress_monitor(
    ctx: RunContext,
    mut session: BatchSession,
    stats: Arc<BatchStatistics>,
    start_time: std::time::Instant,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(PROGRESS_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_terminal = 0usize;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {}
            }

            let snapshot = stats.snapshot();
            let done = snapshot.terminal() + snapshot.skipped_prior_terminal;
            if snapshot.terminal() == last_terminal {
                continue;
            }
            last_terminal = snapshot.terminal();

            let elapsed = start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                snapshot.terminal() as f64 / elapsed
            } else {
                0.0
            };
            let eta_secs = if rate > 0.0 {
                Some((snapshot.outstanding() as f64 / rate) as u64)
            } else {
                None
            };

            tracing::info!(
                "{} | Rate: {:.1} captures/sec | ETA: {}s",
                snapshot.display_string(),
                rate,
                eta_secs.unwrap_or(0),
            );

            session.update_progress(done, snapshot.enumerated, snapshot.display_string());

            // Best-effort: progress bookkeeping never competes with
            // checkpoint durability
            let _ = runs::save_run(&ctx.db, &session).await;

            ctx.event_bus.emit_lossy(KovaEvent::BatchProgressUpdate {
                session_id: session.session_id,
                phase: RunPhase::Processing,
                current: done,
                total: snapshot.enumerated,
                percentage: if snapshot.enumerated > 0 {
                    (done as f32 / snapshot.enumerated as f32) * 100.0
                } else {
                    0.0
                },
                current_operation: snapshot.display_string(),
                elapsed_seconds: start_time.elapsed().as_secs(),
                estimated_remaining_seconds: eta_secs,
                timestamp: chrono::Utc::now(),
            });
        }
    })
}
