//! Batch run statistics tracking
//!
//! Shared counters updated by the dispatcher and workers, read by the
//! progress monitor. Counters are atomics so workers never contend on a
//! lock while recording outcomes.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters for one batch run
#[derive(Debug, Default)]
pub struct BatchStatistics {
    /// Captures yielded by the enumerator
    enumerated: AtomicUsize,
    /// Captures skipped because a prior run already finished them
    skipped_prior_terminal: AtomicUsize,
    /// Captures admitted to a worker slot
    started: AtomicUsize,
    /// Captures reaching Completed with an Accepted decision
    accepted: AtomicUsize,
    /// Captures reaching Completed with a Rejected decision
    rejected: AtomicUsize,
    /// Captures reaching PermanentlyFailed
    permanently_failed: AtomicUsize,
}

impl BatchStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enumerated(&self) {
        self.enumerated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_prior_terminal(&self) {
        self.skipped_prior_terminal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_permanently_failed(&self) {
        self.permanently_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent point-in-time view of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enumerated: self.enumerated.load(Ordering::Relaxed),
            skipped_prior_terminal: self.skipped_prior_terminal.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            permanently_failed: self.permanently_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of run counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub enumerated: usize,
    pub skipped_prior_terminal: usize,
    pub started: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub permanently_failed: usize,
}

impl StatsSnapshot {
    /// Captures that reached a terminal state this run
    pub fn terminal(&self) -> usize {
        self.accepted + self.rejected + self.permanently_failed
    }

    /// Captures still owed a terminal state this run
    pub fn outstanding(&self) -> usize {
        self.enumerated
            .saturating_sub(self.skipped_prior_terminal)
            .saturating_sub(self.terminal())
    }

    /// Display: "Processing X to Y of Z"
    pub fn display_string(&self) -> String {
        format!(
            "Processing {} to {} of {} ({} accepted, {} rejected, {} failed, {} resumed-skip)",
            self.terminal(),
            self.started,
            self.enumerated,
            self.accepted,
            self.rejected,
            self.permanently_failed,
            self.skipped_prior_terminal,
        )
    }
}
