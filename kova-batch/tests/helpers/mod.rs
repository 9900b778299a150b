//! Shared fixtures for integration tests: dataset builders and a
//! controllable-latency modality processor double.

use async_trait::async_trait;
use kova_batch::config::ProcessingConfig;
use kova_batch::processors::{ModalityProcessor, ProcessingError};
use kova_batch::types::{ModalityKind, ModalityMetrics, ProcessedData, RawDataRef};
use kova_batch::RunContext;
use kova_common::events::EventBus;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Write one capture directory with an index and a small payload per modality
pub fn write_capture(root: &Path, name: &str, modalities: &[ModalityKind]) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    let mut index = BTreeMap::new();
    for kind in modalities {
        let file_name = format!("{}.bin", kind.as_str());
        std::fs::write(dir.join(&file_name), [1u8, 2, 3, 4]).unwrap();
        index.insert(kind.as_str().to_string(), file_name);
    }

    let index_json = serde_json::json!({ "modalities": index });
    std::fs::write(
        dir.join("capture.json"),
        serde_json::to_string_pretty(&index_json).unwrap(),
    )
    .unwrap();
}

/// Build a run context over a fresh checkpoint store under `root`
pub async fn run_context(root: &Path, config: ProcessingConfig) -> RunContext {
    let db = kova_batch::db::init_checkpoint_pool(&root.join(".kova").join("checkpoints.db"))
        .await
        .unwrap();
    RunContext::new(db, EventBus::new(100), config)
}

/// Controllable modality processor double
///
/// Lets tests script latency, scores, and per-capture permanent failures,
/// and observes call counts plus the peak number of concurrent calls.
pub struct MockProcessor {
    kind: ModalityKind,
    latency: Duration,
    score: f64,
    fail_captures: HashSet<String>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockProcessor {
    pub fn new(kind: ModalityKind) -> Self {
        Self {
            kind,
            latency: Duration::ZERO,
            score: 0.9,
            fail_captures: HashSet::new(),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Fail every attempt for the named captures
    pub fn failing_for(mut self, captures: &[&str]) -> Self {
        self.fail_captures = captures.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Peak number of concurrent in-flight calls observed
    pub fn max_active(&self) -> Arc<AtomicUsize> {
        self.max_active.clone()
    }

    /// Per-capture call counts
    pub fn calls(&self) -> Arc<Mutex<HashMap<String, usize>>> {
        self.calls.clone()
    }

    fn capture_name(raw: &RawDataRef) -> String {
        raw.path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModalityProcessor for MockProcessor {
    fn kind(&self) -> ModalityKind {
        self.kind
    }

    async fn process(
        &self,
        raw: &RawDataRef,
    ) -> Result<(ProcessedData, ModalityMetrics), ProcessingError> {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        let capture = Self::capture_name(raw);
        *self.calls.lock().unwrap().entry(capture.clone()).or_insert(0) += 1;

        if self.fail_captures.contains(&capture) {
            return Err(ProcessingError::Internal(format!(
                "scripted failure for {}",
                capture
            )));
        }

        let data = ProcessedData {
            modality: self.kind,
            bytes_processed: 4,
            attributes: BTreeMap::new(),
        };
        let metrics = ModalityMetrics::new().with("quality", self.score);
        Ok((data, metrics))
    }
}
