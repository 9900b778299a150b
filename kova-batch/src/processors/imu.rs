//! IMU modality processor
//!
//! Raw payload is a packed sequence of little-endian f32 6-tuples
//! `(ax, ay, az, gx, gy, gz)` — accelerometer in m/s², gyroscope in rad/s.
//! Quality dimensions:
//! - `sample_coverage`: sample count against the configured capture window
//! - `gyro_stability`: mean gyroscope bias magnitude mapped to [0,1]
//!   (a stationary, well-calibrated unit scores high)
//! - `gravity_consistency`: mean accelerometer magnitude against 1 g

use super::{read_payload, ModalityProcessor, ProcessingError};
use crate::config::ImuConfig;
use crate::types::{ModalityKind, ModalityMetrics, ProcessedData, RawDataRef};
use std::collections::BTreeMap;

const STANDARD_GRAVITY: f64 = 9.80665;

pub struct ImuProcessor {
    config: ImuConfig,
}

impl ImuProcessor {
    pub fn new(config: ImuConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ModalityProcessor for ImuProcessor {
    fn kind(&self) -> ModalityKind {
        ModalityKind::Imu
    }

    async fn process(
        &self,
        raw: &RawDataRef,
    ) -> Result<(ProcessedData, ModalityMetrics), ProcessingError> {
        let stride = self.config.sample_stride_bytes as usize;
        let bytes = read_payload(raw, self.config.sample_stride_bytes).await?;

        if bytes.len() % stride != 0 {
            return Err(ProcessingError::InvalidInput(format!(
                "{}: payload length {} is not a multiple of the sample stride {}",
                raw.path.display(),
                bytes.len(),
                stride
            )));
        }

        let count = bytes.len() / stride;
        let mut accel_mag_sum = 0.0f64;
        let mut gyro_sum = [0.0f64; 3];
        let mut valid = 0usize;

        for record in bytes.chunks_exact(stride) {
            let mut fields = [0.0f32; 6];
            for (i, field) in fields.iter_mut().enumerate() {
                let offset = i * 4;
                *field = f32::from_le_bytes([
                    record[offset],
                    record[offset + 1],
                    record[offset + 2],
                    record[offset + 3],
                ]);
            }
            if fields.iter().any(|f| !f.is_finite()) {
                continue;
            }
            valid += 1;
            accel_mag_sum += ((fields[0] as f64).powi(2)
                + (fields[1] as f64).powi(2)
                + (fields[2] as f64).powi(2))
            .sqrt();
            gyro_sum[0] += fields[3] as f64;
            gyro_sum[1] += fields[4] as f64;
            gyro_sum[2] += fields[5] as f64;
        }

        if valid == 0 {
            return Err(ProcessingError::InvalidInput(format!(
                "{}: no finite IMU samples",
                raw.path.display()
            )));
        }

        let n = valid as f64;
        let gyro_bias =
            (gyro_sum[0] / n).hypot((gyro_sum[1] / n).hypot(gyro_sum[2] / n));
        let mean_accel_mag = accel_mag_sum / n;

        let sample_coverage = (valid as f64 / self.config.target_sample_count as f64).min(1.0);
        let gyro_stability = 1.0 / (1.0 + gyro_bias);
        let gravity_consistency =
            1.0 - ((mean_accel_mag - STANDARD_GRAVITY).abs() / STANDARD_GRAVITY).min(1.0);

        let metrics = ModalityMetrics::new()
            .with("sample_coverage", sample_coverage)
            .with("gyro_stability", gyro_stability)
            .with("gravity_consistency", gravity_consistency);

        tracing::debug!(
            path = %raw.path.display(),
            samples = count,
            valid,
            gyro_bias,
            "IMU payload processed"
        );

        let data = ProcessedData {
            modality: ModalityKind::Imu,
            bytes_processed: bytes.len() as u64,
            attributes: BTreeMap::from([
                ("sample_count".to_string(), serde_json::json!(count)),
                ("gyro_bias".to_string(), serde_json::json!(gyro_bias)),
            ]),
        };

        Ok((data, metrics))
    }
}
