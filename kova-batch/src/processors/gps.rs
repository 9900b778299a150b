//! GPS modality processor
//!
//! Raw payload is an NMEA 0183 sentence log (one `$...` sentence per line).
//! Quality dimensions:
//! - `coverage`: sentence count against the configured target
//! - `sentence_integrity`: fraction of sentences carrying a checksum field
//! - `fix_availability`: fraction of RMC sentences reporting an active fix

use super::{read_payload, ModalityProcessor, ProcessingError};
use crate::config::GpsConfig;
use crate::types::{ModalityKind, ModalityMetrics, ProcessedData, RawDataRef};
use std::collections::BTreeMap;

pub struct GpsProcessor {
    config: GpsConfig,
}

impl GpsProcessor {
    pub fn new(config: GpsConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ModalityProcessor for GpsProcessor {
    fn kind(&self) -> ModalityKind {
        ModalityKind::Gps
    }

    async fn process(
        &self,
        raw: &RawDataRef,
    ) -> Result<(ProcessedData, ModalityMetrics), ProcessingError> {
        let bytes = read_payload(raw, 1).await?;
        let text = String::from_utf8(bytes).map_err(|e| {
            ProcessingError::InvalidInput(format!(
                "{}: log is not valid UTF-8: {}",
                raw.path.display(),
                e
            ))
        })?;

        let sentences: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with('$'))
            .collect();

        if sentences.is_empty() || (sentences.len() as u64) < self.config.min_sentences {
            return Err(ProcessingError::InvalidInput(format!(
                "{}: only {} NMEA sentences, minimum {}",
                raw.path.display(),
                sentences.len(),
                self.config.min_sentences
            )));
        }

        let with_checksum = sentences.iter().filter(|s| s.contains('*')).count();
        let sentence_integrity = with_checksum as f64 / sentences.len() as f64;

        // RMC status field (index 2): "A" = active fix, "V" = void
        let rmc: Vec<&&str> = sentences
            .iter()
            .filter(|s| s.get(3..6).map(|t| t == "RMC").unwrap_or(false))
            .collect();
        let fix_availability = if rmc.is_empty() {
            0.0
        } else {
            let active = rmc
                .iter()
                .filter(|s| s.split(',').nth(2) == Some("A"))
                .count();
            active as f64 / rmc.len() as f64
        };

        let coverage = (sentences.len() as f64 / self.config.target_sentences as f64).min(1.0);

        let metrics = ModalityMetrics::new()
            .with("coverage", coverage)
            .with("sentence_integrity", sentence_integrity)
            .with("fix_availability", fix_availability);

        tracing::debug!(
            path = %raw.path.display(),
            sentences = sentences.len(),
            rmc = rmc.len(),
            "GPS log processed"
        );

        let data = ProcessedData {
            modality: ModalityKind::Gps,
            bytes_processed: text.len() as u64,
            attributes: BTreeMap::from([(
                "sentence_count".to_string(),
                serde_json::json!(sentences.len()),
            )]),
        };

        Ok((data, metrics))
    }
}
