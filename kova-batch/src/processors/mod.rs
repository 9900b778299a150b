//! Modality processor contract and dispatch
//!
//! Each sensor modality has one processor implementing the uniform
//! `ModalityProcessor` trait. The scheduler treats processors as external
//! collaborators: calls are idempotent, touch no shared state, and are
//! wrapped in a caller-supplied timeout (an elapsed deadline is recorded as
//! `ProcessingError::Timeout`). Dispatch is a tagged-variant table keyed by
//! `ModalityKind` rather than any inheritance scheme.
//!
//! The bundled processors validate raw payloads and derive named quality
//! dimensions; heavyweight signal reconstruction (demosaicing, geodetic
//! conversion, calibration) belongs to the upstream sensor toolchain.

mod gps;
mod image;
mod imu;
mod point_cloud;
mod thermal;

pub use gps::GpsProcessor;
pub use image::ImageProcessor;
pub use imu::ImuProcessor;
pub use point_cloud::PointCloudProcessor;
pub use thermal::ThermalProcessor;

use crate::config::ProcessingConfig;
use crate::types::{ModalityKind, ModalityMetrics, ProcessedData, ProcessingErrorKind, RawDataRef};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Modality processing errors
///
/// All three kinds are recoverable at the scheduler level: the attempt is
/// retried up to the configured limit before the failure is recorded.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Processor exceeded the caller-supplied deadline
    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),

    /// Raw payload missing, truncated, or malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Processor-internal failure
    #[error("Internal failure: {0}")]
    Internal(String),
}

impl ProcessingError {
    /// Condensed kind for checkpoint records
    pub fn kind(&self) -> ProcessingErrorKind {
        match self {
            ProcessingError::Timeout(_) => ProcessingErrorKind::Timeout,
            ProcessingError::InvalidInput(_) => ProcessingErrorKind::InvalidInput,
            ProcessingError::Internal(_) => ProcessingErrorKind::Internal,
        }
    }
}

/// Uniform per-modality processing contract
///
/// Constraints the scheduler relies on:
/// - `process` is idempotent (safe to retry with identical inputs)
/// - no shared state is mutated outside the returned output
/// - the call completes or fails within the caller-supplied timeout
#[async_trait::async_trait]
pub trait ModalityProcessor: Send + Sync {
    /// Modality this processor handles
    fn kind(&self) -> ModalityKind;

    /// Process one raw payload into output data plus quality metrics
    ///
    /// # Errors
    /// Returns `ProcessingError` on missing/malformed input or internal
    /// failure; the scheduler isolates the failure to this modality.
    async fn process(
        &self,
        raw: &RawDataRef,
    ) -> Result<(ProcessedData, ModalityMetrics), ProcessingError>;
}

/// Tagged-variant dispatch table: one processor per modality
#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: BTreeMap<ModalityKind, Arc<dyn ModalityProcessor>>,
}

impl ProcessorRegistry {
    /// Empty registry; processors are registered explicitly
    pub fn new() -> Self {
        Self {
            processors: BTreeMap::new(),
        }
    }

    /// Registry with the five bundled processors configured from `config`
    pub fn with_defaults(config: &ProcessingConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImageProcessor::new(config.image.clone())));
        registry.register(Arc::new(PointCloudProcessor::new(config.point_cloud.clone())));
        registry.register(Arc::new(ImuProcessor::new(config.imu.clone())));
        registry.register(Arc::new(GpsProcessor::new(config.gps.clone())));
        registry.register(Arc::new(ThermalProcessor::new(config.thermal.clone())));
        registry
    }

    /// Register a processor under its own modality; replaces any prior one
    pub fn register(&mut self, processor: Arc<dyn ModalityProcessor>) {
        self.processors.insert(processor.kind(), processor);
    }

    pub fn get(&self, kind: ModalityKind) -> Option<Arc<dyn ModalityProcessor>> {
        self.processors.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a raw payload, enforcing a minimum usable size
pub(crate) async fn read_payload(
    raw: &RawDataRef,
    min_bytes: u64,
) -> Result<Vec<u8>, ProcessingError> {
    let bytes = tokio::fs::read(&raw.path).await.map_err(|e| {
        ProcessingError::InvalidInput(format!("{}: {}", raw.path.display(), e))
    })?;

    if (bytes.len() as u64) < min_bytes {
        return Err(ProcessingError::InvalidInput(format!(
            "{}: payload too small ({} bytes, minimum {})",
            raw.path.display(),
            bytes.len(),
            min_bytes
        )));
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_all_modalities() {
        let registry = ProcessorRegistry::with_defaults(&ProcessingConfig::default());
        assert_eq!(registry.len(), ModalityKind::ALL.len());
        for kind in ModalityKind::ALL {
            let processor = registry.get(kind).expect("processor registered");
            assert_eq!(processor.kind(), kind);
        }
    }

    #[tokio::test]
    async fn test_read_payload_missing_file_is_invalid_input() {
        let raw = RawDataRef {
            modality: ModalityKind::Image,
            path: "/nonexistent/cam0.raw".into(),
        };
        match read_payload(&raw, 1).await {
            Err(e) => assert_eq!(e.kind(), ProcessingErrorKind::InvalidInput),
            Ok(_) => panic!("Expected InvalidInput"),
        }
    }
}
