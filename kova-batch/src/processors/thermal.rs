//! Thermal modality processor
//!
//! Raw payload is a radiometric frame of little-endian u16 samples.
//! Quality dimensions:
//! - `dynamic_range`: spread between coldest and hottest sample
//! - `liveness`: fraction of non-zero (non-dead) samples
//! - `noise_floor`: inverse of the normalized sample-to-sample jitter

use super::{read_payload, ModalityProcessor, ProcessingError};
use crate::config::ThermalConfig;
use crate::types::{ModalityKind, ModalityMetrics, ProcessedData, RawDataRef};
use std::collections::BTreeMap;

pub struct ThermalProcessor {
    config: ThermalConfig,
}

impl ThermalProcessor {
    pub fn new(config: ThermalConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ModalityProcessor for ThermalProcessor {
    fn kind(&self) -> ModalityKind {
        ModalityKind::Thermal
    }

    async fn process(
        &self,
        raw: &RawDataRef,
    ) -> Result<(ProcessedData, ModalityMetrics), ProcessingError> {
        let bytes = read_payload(raw, self.config.min_bytes).await?;

        if bytes.len() % 2 != 0 {
            return Err(ProcessingError::InvalidInput(format!(
                "{}: radiometric payload has odd length {}",
                raw.path.display(),
                bytes.len()
            )));
        }

        let samples: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        if samples.is_empty() {
            return Err(ProcessingError::InvalidInput(format!(
                "{}: empty radiometric payload",
                raw.path.display()
            )));
        }

        let min = samples.iter().copied().min().unwrap_or(0);
        let max = samples.iter().copied().max().unwrap_or(0);
        let dynamic_range = (max - min) as f64 / u16::MAX as f64;

        let live = samples.iter().filter(|&&s| s != 0).count();
        let liveness = live as f64 / samples.len() as f64;

        let mut jitter_sum = 0.0f64;
        for pair in samples.windows(2) {
            jitter_sum += (pair[0] as f64 - pair[1] as f64).abs();
        }
        let mean_jitter = if samples.len() > 1 {
            jitter_sum / (samples.len() - 1) as f64
        } else {
            0.0
        };
        let noise_floor = 1.0 - (mean_jitter / u16::MAX as f64).min(1.0);

        let metrics = ModalityMetrics::new()
            .with("dynamic_range", dynamic_range)
            .with("liveness", liveness)
            .with("noise_floor", noise_floor);

        tracing::debug!(
            path = %raw.path.display(),
            samples = samples.len(),
            dynamic_range,
            "Thermal frame processed"
        );

        let data = ProcessedData {
            modality: ModalityKind::Thermal,
            bytes_processed: bytes.len() as u64,
            attributes: BTreeMap::from([
                ("sample_count".to_string(), serde_json::json!(samples.len())),
                ("raw_min".to_string(), serde_json::json!(min)),
                ("raw_max".to_string(), serde_json::json!(max)),
            ]),
        };

        Ok((data, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_frame(dir: &TempDir, name: &str, samples: &[u16]) -> RawDataRef {
        let mut payload = Vec::new();
        for s in samples {
            payload.extend_from_slice(&s.to_le_bytes());
        }
        let path = dir.path().join(name);
        std::fs::write(&path, payload).unwrap();
        RawDataRef {
            modality: ModalityKind::Thermal,
            path,
        }
    }

    fn small_config() -> ThermalConfig {
        ThermalConfig {
            expected_bytes: 512,
            min_bytes: 8,
        }
    }

    #[tokio::test]
    async fn test_smooth_gradient_frame_scores_well() {
        let dir = TempDir::new().unwrap();
        let samples: Vec<u16> = (0..256).map(|i| 1000 + i * 16).collect();
        let raw = write_frame(&dir, "frame.raw", &samples);

        let processor = ThermalProcessor::new(small_config());
        let (_, metrics) = processor.process(&raw).await.unwrap();

        assert_eq!(metrics.get("liveness"), Some(1.0));
        assert!(metrics.get("noise_floor").unwrap() > 0.99);
        assert!(metrics.get("dynamic_range").unwrap() > 0.05);
    }

    #[tokio::test]
    async fn test_dead_sensor_scores_zero_liveness() {
        let dir = TempDir::new().unwrap();
        let raw = write_frame(&dir, "dead.raw", &[0u16; 256]);

        let processor = ThermalProcessor::new(small_config());
        let (_, metrics) = processor.process(&raw).await.unwrap();
        assert_eq!(metrics.get("liveness"), Some(0.0));
        assert_eq!(metrics.get("dynamic_range"), Some(0.0));
    }

    #[tokio::test]
    async fn test_odd_length_payload_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("odd.raw");
        std::fs::write(&path, vec![0u8; 9]).unwrap();
        let raw = RawDataRef {
            modality: ModalityKind::Thermal,
            path,
        };

        let processor = ThermalProcessor::new(small_config());
        assert!(matches!(
            processor.process(&raw).await,
            Err(ProcessingError::InvalidInput(_))
        ));
    }
}
