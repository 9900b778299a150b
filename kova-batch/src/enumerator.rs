//! Capture enumerator
//!
//! Walks a dataset root and lazily yields one `CaptureManifestEntry` per
//! capture directory. Each immediate subdirectory of the root is one capture
//! and must contain a `capture.json` index naming the modalities present and
//! their raw-data files. A missing or malformed index is an
//! `EnumerationError` and fatal to the whole run: it means the dataset
//! cannot be trusted.
//!
//! The sequence is finite and not restartable mid-run; resume is handled by
//! the scheduler consulting the checkpoint store, never by re-walking here.

use crate::types::{CaptureId, CaptureManifestEntry, ModalityKind, RawDataRef};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Capture index file name, one per capture directory
pub const CAPTURE_INDEX_FILE: &str = "capture.json";

/// Capture enumeration errors (all fatal to the run)
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// Dataset root does not exist
    #[error("Dataset root not found: {0}")]
    RootNotFound(PathBuf),

    /// Dataset root exists but is not a directory
    #[error("Dataset root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot read the dataset root or a capture directory
    #[error("Cannot read {0}: {1}")]
    Unreadable(PathBuf, String),

    /// Capture directory has no index metadata
    #[error("Capture {0} is missing its {CAPTURE_INDEX_FILE} index")]
    MissingIndex(CaptureId),

    /// Capture index exists but cannot be parsed or is inconsistent
    #[error("Capture {0} has an invalid index: {1}")]
    InvalidIndex(CaptureId, String),
}

/// On-disk shape of `capture.json`
#[derive(Debug, Deserialize)]
struct CaptureIndex {
    /// Modality name -> raw data file, relative to the capture directory
    modalities: BTreeMap<String, String>,
}

/// Dataset walker producing capture manifests
pub struct CaptureEnumerator {
    ignore_patterns: Vec<String>,
}

impl CaptureEnumerator {
    /// Create an enumerator with default ignore patterns
    ///
    /// Ignores bookkeeping directories like `.kova` (checkpoint store),
    /// `.git`, and OS litter.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".kova".to_string(),
                ".git".to_string(),
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
            ],
        }
    }

    /// Enumerate captures under `root`, in directory-name order
    ///
    /// Returns a lazy iterator: capture directories are listed eagerly (the
    /// root must be consistent up front), but each index file is read and
    /// validated only when the scheduler pulls the entry. Any yielded error
    /// aborts the run.
    pub fn enumerate(
        &self,
        root: &Path,
    ) -> Result<impl Iterator<Item = Result<CaptureManifestEntry, EnumerationError>>, EnumerationError>
    {
        if !root.exists() {
            return Err(EnumerationError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(EnumerationError::NotADirectory(root.to_path_buf()));
        }

        let mut capture_dirs = Vec::new();
        let entries = std::fs::read_dir(root)
            .map_err(|e| EnumerationError::Unreadable(root.to_path_buf(), e.to_string()))?;
        for entry in entries {
            let entry = entry
                .map_err(|e| EnumerationError::Unreadable(root.to_path_buf(), e.to_string()))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.is_ignored(&name) {
                continue;
            }
            capture_dirs.push((name, path));
        }

        // Directory-name order keeps enumeration deterministic across runs
        capture_dirs.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::debug!(
            root = %root.display(),
            captures = capture_dirs.len(),
            "Capture enumeration prepared"
        );

        Ok(capture_dirs
            .into_iter()
            .map(|(name, path)| read_manifest_entry(CaptureId::new(name), path)))
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore_patterns.iter().any(|p| name == p)
    }
}

impl Default for CaptureEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and validate one capture directory's index metadata
fn read_manifest_entry(
    capture_id: CaptureId,
    capture_dir: PathBuf,
) -> Result<CaptureManifestEntry, EnumerationError> {
    let index_path = capture_dir.join(CAPTURE_INDEX_FILE);
    if !index_path.exists() {
        return Err(EnumerationError::MissingIndex(capture_id));
    }

    let content = std::fs::read_to_string(&index_path)
        .map_err(|e| EnumerationError::Unreadable(index_path.clone(), e.to_string()))?;
    let index: CaptureIndex = serde_json::from_str(&content)
        .map_err(|e| EnumerationError::InvalidIndex(capture_id.clone(), e.to_string()))?;

    if index.modalities.is_empty() {
        return Err(EnumerationError::InvalidIndex(
            capture_id,
            "index lists no modalities".to_string(),
        ));
    }

    let mut modalities = BTreeMap::new();
    for (name, rel_path) in index.modalities {
        let kind: ModalityKind = name.parse().map_err(|e: String| {
            EnumerationError::InvalidIndex(capture_id.clone(), e)
        })?;

        // Reject refs escaping the capture directory
        let rel = Path::new(&rel_path);
        if rel.is_absolute() || rel.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(EnumerationError::InvalidIndex(
                capture_id,
                format!("raw data ref escapes capture directory: {}", rel_path),
            ));
        }

        modalities.insert(
            kind,
            RawDataRef {
                modality: kind,
                path: capture_dir.join(rel),
            },
        );
    }

    Ok(CaptureManifestEntry {
        capture_id,
        capture_dir,
        modalities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_capture(root: &Path, name: &str, index_json: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CAPTURE_INDEX_FILE), index_json).unwrap();
    }

    #[test]
    fn test_enumerate_nonexistent_root() {
        let enumerator = CaptureEnumerator::new();
        let result = enumerator.enumerate(Path::new("/nonexistent/dataset"));
        match result {
            Err(EnumerationError::RootNotFound(_)) => {}
            _ => panic!("Expected RootNotFound error"),
        }
    }

    #[test]
    fn test_enumerate_file_as_root() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not_a_dir");
        fs::write(&file_path, b"x").unwrap();

        let enumerator = CaptureEnumerator::new();
        match enumerator.enumerate(&file_path) {
            Err(EnumerationError::NotADirectory(_)) => {}
            _ => panic!("Expected NotADirectory error"),
        }
    }

    #[test]
    fn test_enumerate_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let enumerator = CaptureEnumerator::new();
        let entries: Vec<_> = enumerator.enumerate(temp_dir.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_enumerate_yields_sorted_entries() {
        let temp_dir = TempDir::new().unwrap();
        write_capture(
            temp_dir.path(),
            "capture_0002",
            r#"{"modalities": {"image": "cam0.raw"}}"#,
        );
        write_capture(
            temp_dir.path(),
            "capture_0001",
            r#"{"modalities": {"image": "cam0.raw", "gps": "fix.nmea"}}"#,
        );

        let enumerator = CaptureEnumerator::new();
        let entries: Vec<_> = enumerator
            .enumerate(temp_dir.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].capture_id.as_str(), "capture_0001");
        assert_eq!(entries[1].capture_id.as_str(), "capture_0002");
        assert!(entries[0].has_modality(ModalityKind::Gps));
        assert!(!entries[1].has_modality(ModalityKind::Gps));
    }

    #[test]
    fn test_missing_index_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("capture_0001")).unwrap();

        let enumerator = CaptureEnumerator::new();
        let mut entries = enumerator.enumerate(temp_dir.path()).unwrap();
        match entries.next() {
            Some(Err(EnumerationError::MissingIndex(id))) => {
                assert_eq!(id.as_str(), "capture_0001");
            }
            other => panic!("Expected MissingIndex, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_index_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        write_capture(temp_dir.path(), "capture_0001", "{not json");

        let enumerator = CaptureEnumerator::new();
        let mut entries = enumerator.enumerate(temp_dir.path()).unwrap();
        assert!(matches!(
            entries.next(),
            Some(Err(EnumerationError::InvalidIndex(_, _)))
        ));
    }

    #[test]
    fn test_unknown_modality_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        write_capture(
            temp_dir.path(),
            "capture_0001",
            r#"{"modalities": {"sonar": "ping.raw"}}"#,
        );

        let enumerator = CaptureEnumerator::new();
        let mut entries = enumerator.enumerate(temp_dir.path()).unwrap();
        assert!(matches!(
            entries.next(),
            Some(Err(EnumerationError::InvalidIndex(_, _)))
        ));
    }

    #[test]
    fn test_escaping_raw_ref_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        write_capture(
            temp_dir.path(),
            "capture_0001",
            r#"{"modalities": {"image": "../../etc/passwd"}}"#,
        );

        let enumerator = CaptureEnumerator::new();
        let mut entries = enumerator.enumerate(temp_dir.path()).unwrap();
        assert!(matches!(
            entries.next(),
            Some(Err(EnumerationError::InvalidIndex(_, _)))
        ));
    }

    #[test]
    fn test_bookkeeping_directories_ignored() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join(".kova")).unwrap();
        write_capture(
            temp_dir.path(),
            "capture_0001",
            r#"{"modalities": {"imu": "imu.bin"}}"#,
        );

        let enumerator = CaptureEnumerator::new();
        let entries: Vec<_> = enumerator
            .enumerate(temp_dir.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
    }
}
