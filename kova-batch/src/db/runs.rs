//! Batch run session persistence
//!
//! Run sessions record which invocations touched the dataset and with what
//! configuration; they are bookkeeping, not resume state. Resume is driven
//! entirely by `checkpoint_records`.

use crate::config::ProcessingConfig;
use crate::session::{BatchSession, RunProgress, RunState};
use kova_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Save (upsert) a batch run session
pub async fn save_run(pool: &SqlitePool, session: &BatchSession) -> Result<()> {
    let session_id = session.session_id.to_string();
    let state = serde_json::to_string(&session.state)
        .map_err(|e| Error::Internal(format!("Failed to serialize state: {}", e)))?;
    let config = serde_json::to_string(&session.config)
        .map_err(|e| Error::Internal(format!("Failed to serialize config: {}", e)))?;
    let started_at = session.started_at.to_rfc3339();
    let ended_at = session.ended_at.map(|dt| dt.to_rfc3339());

    sqlx::query(
        r#"
        INSERT INTO batch_runs (
            session_id, state, dataset_root, config,
            progress_current, progress_total, current_operation,
            started_at, ended_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            state = excluded.state,
            progress_current = excluded.progress_current,
            progress_total = excluded.progress_total,
            current_operation = excluded.current_operation,
            ended_at = excluded.ended_at
        "#,
    )
    .bind(&session_id)
    .bind(&state)
    .bind(&session.dataset_root)
    .bind(&config)
    .bind(session.progress.current as i64)
    .bind(session.progress.total as i64)
    .bind(&session.progress.current_operation)
    .bind(&started_at)
    .bind(&ended_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a batch run session by id
pub async fn load_run(pool: &SqlitePool, session_id: Uuid) -> Result<Option<BatchSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, state, dataset_root, config,
               progress_current, progress_total, current_operation,
               started_at, ended_at
        FROM batch_runs
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: String = row.get("state");
    let state: RunState = serde_json::from_str(&state)
        .map_err(|e| Error::Internal(format!("Failed to deserialize state: {}", e)))?;

    let config: String = row.get("config");
    let config: ProcessingConfig = serde_json::from_str(&config)
        .map_err(|e| Error::Internal(format!("Failed to deserialize config: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| Error::Internal(format!("Failed to parse started_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse ended_at: {}", e)))?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let current = row.get::<i64, _>("progress_current") as usize;
    let total = row.get::<i64, _>("progress_total") as usize;
    let progress = RunProgress {
        current,
        total,
        percentage: if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        },
        current_operation: row.get("current_operation"),
        elapsed_seconds: if let Some(end) = ended_at {
            (end - started_at).num_seconds().max(0) as u64
        } else {
            (chrono::Utc::now() - started_at).num_seconds().max(0) as u64
        },
        estimated_remaining_seconds: None,
    };

    Ok(Some(BatchSession {
        session_id,
        state,
        dataset_root: row.get("dataset_root"),
        config,
        progress,
        started_at,
        ended_at,
    }))
}

/// Mark stale run sessions as cancelled on startup
///
/// A run not in a terminal state when the process starts belongs to a
/// previous invocation and will never progress; its interrupted captures
/// are picked up through the checkpoint store's latest-InProgress rule.
pub async fn cleanup_stale_runs(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE batch_runs
        SET state = '"CANCELLED"',
            ended_at = ?,
            current_operation = 'Run interrupted - process restarted'
        WHERE state = '"RUNNING"'
        "#,
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}
