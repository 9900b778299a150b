//! Point cloud modality processor
//!
//! Raw payload is a packed sequence of little-endian f32 `(x, y, z)` records.
//! Quality dimensions:
//! - `point_density`: point count against the configured target
//! - `finite_ratio`: fraction of points with all-finite coordinates
//! - `coverage`: octants around the centroid that contain points (a cloud
//!   collapsed onto one side of the sensor scores low)

use super::{read_payload, ModalityProcessor, ProcessingError};
use crate::config::PointCloudConfig;
use crate::types::{ModalityKind, ModalityMetrics, ProcessedData, RawDataRef};
use std::collections::BTreeMap;

pub struct PointCloudProcessor {
    config: PointCloudConfig,
}

impl PointCloudProcessor {
    pub fn new(config: PointCloudConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ModalityProcessor for PointCloudProcessor {
    fn kind(&self) -> ModalityKind {
        ModalityKind::PointCloud
    }

    async fn process(
        &self,
        raw: &RawDataRef,
    ) -> Result<(ProcessedData, ModalityMetrics), ProcessingError> {
        let stride = self.config.point_stride_bytes as usize;
        let bytes = read_payload(raw, self.config.point_stride_bytes).await?;

        if bytes.len() % stride != 0 {
            return Err(ProcessingError::InvalidInput(format!(
                "{}: payload length {} is not a multiple of the point stride {}",
                raw.path.display(),
                bytes.len(),
                stride
            )));
        }

        let mut points = Vec::with_capacity(bytes.len() / stride);
        for record in bytes.chunks_exact(stride) {
            let x = f32::from_le_bytes([record[0], record[1], record[2], record[3]]);
            let y = f32::from_le_bytes([record[4], record[5], record[6], record[7]]);
            let z = f32::from_le_bytes([record[8], record[9], record[10], record[11]]);
            points.push([x, y, z]);
        }

        let total = points.len();
        let finite: Vec<&[f32; 3]> = points
            .iter()
            .filter(|p| p.iter().all(|c| c.is_finite()))
            .collect();
        let finite_ratio = finite.len() as f64 / total as f64;

        let coverage = if finite.is_empty() {
            0.0
        } else {
            let n = finite.len() as f32;
            let centroid = finite.iter().fold([0.0f32; 3], |mut acc, p| {
                acc[0] += p[0] / n;
                acc[1] += p[1] / n;
                acc[2] += p[2] / n;
                acc
            });
            let mut octants = [false; 8];
            for p in &finite {
                let idx = ((p[0] >= centroid[0]) as usize)
                    | (((p[1] >= centroid[1]) as usize) << 1)
                    | (((p[2] >= centroid[2]) as usize) << 2);
                octants[idx] = true;
            }
            octants.iter().filter(|o| **o).count() as f64 / 8.0
        };

        let point_density =
            (finite.len() as f64 / self.config.target_point_count as f64).min(1.0);

        let metrics = ModalityMetrics::new()
            .with("point_density", point_density)
            .with("finite_ratio", finite_ratio)
            .with("coverage", coverage);

        tracing::debug!(
            path = %raw.path.display(),
            points = total,
            finite = finite.len(),
            "Point cloud payload processed"
        );

        let data = ProcessedData {
            modality: ModalityKind::PointCloud,
            bytes_processed: bytes.len() as u64,
            attributes: BTreeMap::from([(
                "point_count".to_string(),
                serde_json::json!(total),
            )]),
        };

        Ok((data, metrics))
    }
}
