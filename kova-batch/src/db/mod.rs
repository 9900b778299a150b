//! Checkpoint database access
//!
//! SQLite-backed durable state for batch runs: the append-only
//! `checkpoint_records` table (the sole source of truth for resume) and the
//! `batch_runs` table for run session bookkeeping. WAL journaling with full
//! synchronous writes so an acknowledged append survives process
//! termination.

pub mod checkpoints;
pub mod runs;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Maximum total time to retry a locked checkpoint write before escalating
pub const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Initialize the checkpoint database connection pool
///
/// Creates the database file (and parent directories) if missing, applies
/// durability pragmas, and ensures the tables exist.
pub async fn init_checkpoint_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to checkpoint database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    // An acknowledged append must survive process termination
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = FULL").execute(&pool).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Initialize checkpoint store tables
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // Append-only capture outcome log; the latest record per capture_id is
    // authoritative
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoint_records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            capture_id TEXT NOT NULL,
            attempt INTEGER NOT NULL,
            state TEXT NOT NULL,
            modality_results TEXT NOT NULL DEFAULT '[]',
            quality TEXT,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_checkpoint_records_capture
        ON checkpoint_records(capture_id, seq)
        "#,
    )
    .execute(pool)
    .await?;

    // Run session bookkeeping
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch_runs (
            session_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            dataset_root TEXT NOT NULL,
            config TEXT NOT NULL,
            progress_current INTEGER NOT NULL DEFAULT 0,
            progress_total INTEGER NOT NULL DEFAULT 0,
            current_operation TEXT NOT NULL DEFAULT '',
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Checkpoint database tables initialized (checkpoint_records, batch_runs)");

    Ok(())
}

/// Default checkpoint database location under a dataset root
pub fn default_checkpoint_path(dataset_root: &Path) -> std::path::PathBuf {
    dataset_root.join(".kova").join("checkpoints.db")
}

#[cfg(test)]
pub(crate) async fn in_memory_pool() -> SqlitePool {
    // Single connection so the in-memory database is shared across queries
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
