//! Batch run configuration
//!
//! `ProcessingConfig` is the single immutable configuration object for one
//! batch run: quality weighting policy, required-modality set, retry and
//! concurrency limits, acceptance threshold, and the per-modality processor
//! configs. Resolution priority is CLI override > TOML file > compiled
//! default; validation failures are fatal at startup.

use crate::types::ModalityKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation error (fatal at startup)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config file {0}: {1}")]
    Read(String, String),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(String, String),
}

/// Composite-score weighting policy
///
/// Pluggable: equal weights, or an explicit per-modality weight map.
/// Weights of modalities absent from a capture contribute nothing to either
/// the numerator or the denominator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum WeightingPolicy {
    /// Every present modality weighs the same
    Equal,
    /// Explicit weights; unlisted modalities weigh 0.0
    PerModality {
        weights: BTreeMap<ModalityKind, f64>,
    },
}

impl WeightingPolicy {
    pub fn weight_for(&self, kind: ModalityKind) -> f64 {
        match self {
            WeightingPolicy::Equal => 1.0,
            WeightingPolicy::PerModality { weights } => {
                weights.get(&kind).copied().unwrap_or(0.0)
            }
        }
    }
}

impl Default for WeightingPolicy {
    fn default() -> Self {
        WeightingPolicy::Equal
    }
}

// ============================================================================
// Per-modality processor configs
// ============================================================================

/// Image processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Expected payload size for the resolution-adequacy dimension
    pub expected_bytes: u64,
    /// Payloads smaller than this are invalid input
    pub min_bytes: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            expected_bytes: 2 * 1024 * 1024,
            min_bytes: 1024,
        }
    }
}

/// Point cloud processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudConfig {
    /// Bytes per point record (x/y/z as f32)
    pub point_stride_bytes: u64,
    /// Point count considered full density
    pub target_point_count: u64,
}

impl Default for PointCloudConfig {
    fn default() -> Self {
        Self {
            point_stride_bytes: 12,
            target_point_count: 100_000,
        }
    }
}

/// IMU processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Bytes per sample record (accel + gyro as f32 triples)
    pub sample_stride_bytes: u64,
    /// Sample count considered a full capture window
    pub target_sample_count: u64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            sample_stride_bytes: 24,
            target_sample_count: 2_000,
        }
    }
}

/// GPS processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Minimum sentence count for a usable fix log
    pub min_sentences: u64,
    /// Sentence count considered full coverage
    pub target_sentences: u64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            min_sentences: 1,
            target_sentences: 100,
        }
    }
}

/// Thermal processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    /// Expected payload size (frame area x 2 bytes per radiometric sample)
    pub expected_bytes: u64,
    /// Payloads smaller than this are invalid input
    pub min_bytes: u64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            expected_bytes: 640 * 480 * 2,
            min_bytes: 512,
        }
    }
}

// ============================================================================
// ProcessingConfig
// ============================================================================

/// Immutable configuration for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Composite-score weighting policy
    pub weighting: WeightingPolicy,
    /// Modalities whose absence or failure forces rejection
    pub required: BTreeSet<ModalityKind>,
    /// Total processing attempts per modality per capture attempt
    pub retry_limit: u32,
    /// Fixed worker pool size (bounds concurrent capture processing)
    pub worker_concurrency: usize,
    /// Bounded work queue depth between enumerator and dispatcher
    pub queue_depth: usize,
    /// Composite score at or above which a capture may be accepted
    pub acceptance_threshold: f64,
    /// Per-attempt modality processing deadline, seconds
    pub modality_timeout_secs: u64,
    /// Per-modality processor configs
    pub image: ImageConfig,
    pub point_cloud: PointCloudConfig,
    pub imu: ImuConfig,
    pub gps: GpsConfig,
    pub thermal: ThermalConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            weighting: WeightingPolicy::Equal,
            required: BTreeSet::from([ModalityKind::Image]),
            retry_limit: 3,
            worker_concurrency: 4,
            queue_depth: 16,
            acceptance_threshold: 0.7,
            modality_timeout_secs: 30,
            image: ImageConfig::default(),
            point_cloud: PointCloudConfig::default(),
            imu: ImuConfig::default(),
            gps: GpsConfig::default(),
            thermal: ThermalConfig::default(),
        }
    }
}

impl ProcessingConfig {
    /// Load from a TOML file; absent file yields defaults
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))?;
        Ok(config)
    }

    /// Per-attempt modality deadline
    pub fn modality_timeout(&self) -> Duration {
        Duration::from_secs(self.modality_timeout_secs)
    }

    pub fn is_required(&self, kind: ModalityKind) -> bool {
        self.required.contains(&kind)
    }

    /// Validate the configuration; any failure is fatal at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.acceptance_threshold.is_finite()
            || self.acceptance_threshold < 0.0
            || self.acceptance_threshold > 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "acceptance_threshold must be within [0, 1], got {}",
                self.acceptance_threshold
            )));
        }

        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker_concurrency must be at least 1".to_string(),
            ));
        }

        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "queue_depth must be at least 1".to_string(),
            ));
        }

        if self.retry_limit == 0 {
            return Err(ConfigError::Invalid(
                "retry_limit must be at least 1".to_string(),
            ));
        }

        if self.modality_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "modality_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.point_cloud.point_stride_bytes < 12 {
            return Err(ConfigError::Invalid(format!(
                "point_cloud.point_stride_bytes must be at least 12 (x/y/z as f32), got {}",
                self.point_cloud.point_stride_bytes
            )));
        }

        if self.imu.sample_stride_bytes < 24 {
            return Err(ConfigError::Invalid(format!(
                "imu.sample_stride_bytes must be at least 24 (six f32 fields), got {}",
                self.imu.sample_stride_bytes
            )));
        }

        if let WeightingPolicy::PerModality { weights } = &self.weighting {
            let mut any_positive = false;
            for (kind, weight) in weights {
                if !weight.is_finite() || *weight < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "weight for modality '{}' must be finite and non-negative, got {}",
                        kind, weight
                    )));
                }
                if *weight > 0.0 {
                    any_positive = true;
                }
            }
            if !any_positive {
                return Err(ConfigError::Invalid(
                    "per-modality weighting needs at least one positive weight".to_string(),
                ));
            }
        }

        Ok(())
    }
}
