//! Batch run session state machine
//!
//! One `BatchSession` per batch invocation: run identity, lifecycle state,
//! a snapshot of the immutable run configuration, and progress counters for
//! operator display. Capture-level durable state lives in the checkpoint
//! store, not here.

use crate::config::ProcessingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Workers processing captures
    Running,
    /// Enumeration exhausted and all dispatched work terminal
    Completed,
    /// Stop signal received; in-flight work drained
    Cancelled,
    /// Fatal error (enumeration or checkpoint store)
    Failed,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// Batch run session (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Current lifecycle state
    pub state: RunState,

    /// Dataset root being processed
    pub dataset_root: String,

    /// Immutable run configuration snapshot
    pub config: ProcessingConfig,

    /// Progress tracking
    pub progress: RunProgress,

    /// Session start time
    pub started_at: DateTime<Utc>,

    /// Session end time (if completed/cancelled/failed)
    pub ended_at: Option<DateTime<Utc>>,
}

/// Progress tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    /// Captures that reached a terminal state so far
    pub current: usize,

    /// Total captures enumerated so far
    pub total: usize,

    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,

    /// Current operation description
    pub current_operation: String,

    /// Elapsed time (seconds)
    pub elapsed_seconds: u64,

    /// Estimated remaining time (seconds), None if unknown
    pub estimated_remaining_seconds: Option<u64>,
}

impl BatchSession {
    /// Create new batch run session
    pub fn new(dataset_root: String, config: ProcessingConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: RunState::Running,
            dataset_root,
            config,
            progress: RunProgress::default(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if self.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Update progress counters and recompute rate-based estimates
    pub fn update_progress(&mut self, current: usize, total: usize, operation: String) {
        self.progress.current = current;
        self.progress.total = total;
        self.progress.percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.progress.current_operation = operation;

        let elapsed = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
        self.progress.elapsed_seconds = elapsed;

        if current > 0 && total > current {
            let rate = elapsed as f64 / current as f64;
            let remaining = ((total - current) as f64 * rate) as u64;
            self.progress.estimated_remaining_seconds = Some(remaining);
        } else {
            self.progress.estimated_remaining_seconds = None;
        }
    }

    /// Check if session is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0.0,
            current_operation: String::from("Initializing..."),
            elapsed_seconds: 0,
            estimated_remaining_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_running() {
        let session = BatchSession::new("/data".to_string(), ProcessingConfig::default());
        assert_eq!(session.state, RunState::Running);
        assert!(!session.is_terminal());
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn test_terminal_transition_sets_end_time() {
        let mut session = BatchSession::new("/data".to_string(), ProcessingConfig::default());
        let transition = session.transition_to(RunState::Completed);
        assert_eq!(transition.old_state, RunState::Running);
        assert_eq!(transition.new_state, RunState::Completed);
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_progress_percentage() {
        let mut session = BatchSession::new("/data".to_string(), ProcessingConfig::default());
        session.update_progress(3, 10, "Processing captures".to_string());
        assert!((session.progress.percentage - 30.0).abs() < 1e-9);

        session.update_progress(0, 0, "Enumerating".to_string());
        assert_eq!(session.progress.percentage, 0.0);
    }
}
