//! kova-batch library interface
//!
//! Quality-gated batch processing for multi-modal sensor captures: the
//! capture enumerator, the per-modality processor contract, the quality
//! assessor, the durable checkpoint store, the bounded-worker batch
//! scheduler, and the report builder.

pub mod config;
pub mod db;
pub mod enumerator;
pub mod processors;
pub mod quality;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod types;
pub mod utils;

use config::ProcessingConfig;
use kova_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Run context shared by every component of one batch invocation
///
/// Constructed once per run and passed explicitly; no component reads
/// ambient global state. The checkpoint pool is the only mutable shared
/// resource, and the configuration is read-only for the run's duration.
#[derive(Clone)]
pub struct RunContext {
    /// Checkpoint database connection pool
    pub db: SqlitePool,
    /// Event bus for progress broadcasting
    pub event_bus: EventBus,
    /// Immutable run configuration
    pub config: Arc<ProcessingConfig>,
}

impl RunContext {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: ProcessingConfig) -> Self {
        Self {
            db,
            event_bus,
            config: Arc::new(config),
        }
    }
}
