//! Checkpoint record persistence
//!
//! Append-only log keyed by capture. Appends for different captures may run
//! in parallel; SQLite's single-writer lock serializes appends for the same
//! capture, and transient lock contention is absorbed by `retry_on_lock`.
//! The latest record per capture is authoritative for resume and reporting.

use crate::db::MAX_LOCK_WAIT_MS;
use crate::types::{CaptureId, CaptureState, CheckpointRecord, ModalityResult, QualityMetrics};
use crate::utils::retry_on_lock;
use kova_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Append one checkpoint record
///
/// A successful return means the record is durable. Lock contention is
/// retried with exponential backoff; a store that stays unwritable is
/// escalated to the caller as fatal.
pub async fn append_record(pool: &SqlitePool, record: &CheckpointRecord) -> Result<()> {
    // Prepare all data before touching the database connection
    let capture_id = record.capture_id.as_str().to_string();
    let state = serde_json::to_string(&record.state)
        .map_err(|e| Error::Internal(format!("Failed to serialize state: {}", e)))?;
    let modality_results = serde_json::to_string(&record.modality_results)
        .map_err(|e| Error::Internal(format!("Failed to serialize modality results: {}", e)))?;
    let quality = record
        .quality
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize quality: {}", e)))?;
    let recorded_at = record.recorded_at.to_rfc3339();
    let attempt = record.attempt as i64;

    retry_on_lock("append_checkpoint", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO checkpoint_records (
                capture_id, attempt, state, modality_results, quality, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&capture_id)
        .bind(attempt)
        .bind(&state)
        .bind(&modality_results)
        .bind(&quality)
        .bind(&recorded_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load the latest (authoritative) record for one capture
pub async fn latest_record(
    pool: &SqlitePool,
    capture_id: &CaptureId,
) -> Result<Option<CheckpointRecord>> {
    let row = sqlx::query(
        r#"
        SELECT capture_id, attempt, state, modality_results, quality, recorded_at
        FROM checkpoint_records
        WHERE capture_id = ?
        ORDER BY seq DESC
        LIMIT 1
        "#,
    )
    .bind(capture_id.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(parse_record).transpose()
}

/// Load the latest record of every capture, in capture-id order
pub async fn all_latest_records(pool: &SqlitePool) -> Result<Vec<CheckpointRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT capture_id, attempt, state, modality_results, quality, recorded_at
        FROM checkpoint_records
        WHERE seq IN (
            SELECT MAX(seq) FROM checkpoint_records GROUP BY capture_id
        )
        ORDER BY capture_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(parse_record).collect()
}

fn parse_record(row: sqlx::sqlite::SqliteRow) -> Result<CheckpointRecord> {
    let state: String = row.get("state");
    let state: CaptureState = serde_json::from_str(&state)
        .map_err(|e| Error::Internal(format!("Failed to deserialize state: {}", e)))?;

    let modality_results: String = row.get("modality_results");
    let modality_results: Vec<ModalityResult> = serde_json::from_str(&modality_results)
        .map_err(|e| Error::Internal(format!("Failed to deserialize modality results: {}", e)))?;

    let quality: Option<String> = row.get("quality");
    let quality: Option<QualityMetrics> = quality
        .map(|q| serde_json::from_str(&q))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize quality: {}", e)))?;

    let recorded_at: String = row.get("recorded_at");
    let recorded_at = chrono::DateTime::parse_from_rfc3339(&recorded_at)
        .map_err(|e| Error::Internal(format!("Failed to parse recorded_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(CheckpointRecord {
        capture_id: CaptureId::new(row.get::<String, _>("capture_id")),
        attempt: row.get::<i64, _>("attempt") as u32,
        state,
        modality_results,
        quality,
        recorded_at,
    })
}
