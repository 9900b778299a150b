//! Image modality processor
//!
//! Derives image quality dimensions from the raw frame payload:
//! - `sharpness`: normalized mean absolute difference between adjacent bytes
//!   (a flat, defocused frame scores low)
//! - `exposure_balance`: distance of the mean level from the extremes
//!   (clipped-dark and clipped-bright frames score low)
//! - `resolution_adequacy`: payload size against the configured expectation

use super::{read_payload, ModalityProcessor, ProcessingError};
use crate::config::ImageConfig;
use crate::types::{ModalityKind, ModalityMetrics, ProcessedData, RawDataRef};
use std::collections::BTreeMap;

pub struct ImageProcessor {
    config: ImageConfig,
}

impl ImageProcessor {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ModalityProcessor for ImageProcessor {
    fn kind(&self) -> ModalityKind {
        ModalityKind::Image
    }

    async fn process(
        &self,
        raw: &RawDataRef,
    ) -> Result<(ProcessedData, ModalityMetrics), ProcessingError> {
        let bytes = read_payload(raw, self.config.min_bytes.max(2)).await?;

        let len = bytes.len();
        let mean = bytes.iter().map(|&b| b as f64).sum::<f64>() / len as f64;

        let mut gradient_sum = 0.0;
        for pair in bytes.windows(2) {
            gradient_sum += (pair[0] as f64 - pair[1] as f64).abs();
        }
        let sharpness = gradient_sum / ((len - 1) as f64 * 255.0);

        let exposure_balance = 1.0 - ((mean / 255.0) - 0.5).abs() * 2.0;
        let resolution_adequacy = (len as f64 / self.config.expected_bytes as f64).min(1.0);

        let metrics = ModalityMetrics::new()
            .with("sharpness", sharpness)
            .with("exposure_balance", exposure_balance)
            .with("resolution_adequacy", resolution_adequacy);

        tracing::debug!(
            path = %raw.path.display(),
            bytes = len,
            sharpness,
            "Image payload processed"
        );

        let data = ProcessedData {
            modality: ModalityKind::Image,
            bytes_processed: len as u64,
            attributes: BTreeMap::from([(
                "mean_level".to_string(),
                serde_json::json!(mean),
            )]),
        };

        Ok((data, metrics))
    }
}
