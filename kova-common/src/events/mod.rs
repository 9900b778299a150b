//! Event types for the Kova batch event system
//!
//! Provides shared event definitions and EventBus for batch tooling.
//! Events are broadcast in-process; subscribers (CLI progress display,
//! tests) receive every event emitted after they subscribe.

mod batch_types;

pub use batch_types::{CaptureOutcomeSummary, ModalityOutcomeKind, RunPhase};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kova batch event types
///
/// Events are broadcast via EventBus and can be serialized for machine
/// consumption. All batch components emit through this central enum so
/// subscribers can match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KovaEvent {
    /// Batch run started
    ///
    /// Triggers:
    /// - CLI: print run header
    /// - Tests: mark run begin
    BatchSessionStarted {
        /// Run session UUID
        session_id: Uuid,
        /// Dataset root being processed
        dataset_root: String,
        /// When the run started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic batch progress update
    ///
    /// Emitted by the scheduler's progress monitor (default every 2s) and on
    /// significant transitions. Not persisted; checkpoint records are the
    /// durable state.
    BatchProgressUpdate {
        /// Run session UUID
        session_id: Uuid,
        /// Current run phase
        phase: RunPhase,
        /// Captures reaching a terminal state so far
        current: usize,
        /// Total captures enumerated so far (grows until enumeration ends)
        total: usize,
        /// Percentage complete (0.0 - 100.0, against the current total)
        percentage: f32,
        /// Human-readable current operation
        current_operation: String,
        /// Elapsed seconds since run start
        elapsed_seconds: u64,
        /// Estimated remaining seconds, None if unknown
        estimated_remaining_seconds: Option<u64>,
        /// Update timestamp
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Capture admitted to a worker slot
    CaptureStarted {
        /// Capture identifier (dataset-unique)
        capture_id: String,
        /// Capture-level attempt number (> 1 after a resume)
        attempt: u32,
        /// When processing began
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Capture reached Completed with a quality decision
    CaptureCompleted {
        /// Capture identifier
        capture_id: String,
        /// Whether the quality gate accepted the capture
        accepted: bool,
        /// Composite quality score (0.0 - 1.0)
        composite_score: f64,
        /// Per-modality outcome summaries
        modalities: Vec<CaptureOutcomeSummary>,
        /// When the terminal record was written
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Capture reached PermanentlyFailed
    ///
    /// Reported but never aborts the run; sibling captures continue.
    CapturePermanentlyFailed {
        /// Capture identifier
        capture_id: String,
        /// Failure description for the operator
        reason: String,
        /// When the terminal record was written
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Batch run finished (enumeration exhausted, all work terminal)
    BatchSessionCompleted {
        /// Run session UUID
        session_id: Uuid,
        /// Captures processed to a terminal state this run
        captures_processed: usize,
        /// Captures accepted by the quality gate
        accepted: usize,
        /// Captures rejected by the quality gate
        rejected: usize,
        /// Captures that could not complete processing
        permanently_failed: usize,
        /// Wall-clock run duration
        duration_seconds: u64,
        /// When the run finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Batch run cancelled before completion (graceful shutdown drained)
    BatchSessionCancelled {
        /// Run session UUID
        session_id: Uuid,
        /// Captures that reached a terminal state before the stop signal
        captures_processed: usize,
        /// When cancellation finished draining
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Event bus for broadcasting Kova batch events
///
/// Wraps a tokio broadcast channel. Slow subscribers lose old events rather
/// than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KovaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<KovaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: KovaEvent,
    ) -> Result<usize, broadcast::error::SendError<KovaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress updates and per-capture notifications are emitted lossily;
    /// the checkpoint store carries the durable record.
    pub fn emit_lossy(&self, event: KovaEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
