//! Database schema creation for all portal tables.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! Timestamps are stored as Unix milliseconds.

use crate::error::Result;
use crate::lock::LOCK_KEY;
use crate::PortalDb;
use tracing::info;

impl PortalDb {
    /// Ensure all tables exist and the lock row is bootstrapped.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_run_tables().await?;
        self.create_audit_tables().await?;
        self.create_lock_table().await?;

        info!("Database schema verified");
        Ok(())
    }

    async fn create_run_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                finished_at INTEGER,
                triggered_by TEXT NOT NULL,
                input_file TEXT NOT NULL,
                workspace_id TEXT NOT NULL DEFAULT '',
                pipeline_item_id TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                error_message TEXT,
                external_job_handle TEXT NOT NULL,
                external_job_id TEXT,
                kpis TEXT,
                app_version TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_audit_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS run_events (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL REFERENCES runs(run_id),
                event_time INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                message TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS run_artifacts (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL REFERENCES runs(run_id),
                artifact_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS run_restores (
                id TEXT PRIMARY KEY,
                restored_at INTEGER NOT NULL,
                restored_by TEXT NOT NULL,
                source_run_id TEXT NOT NULL REFERENCES runs(run_id),
                target_run_id TEXT REFERENCES runs(run_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_run ON run_events(run_id, event_time)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_run ON run_artifacts(run_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_restores_time ON run_restores(restored_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// The lock table holds exactly one row for the lifetime of the
    /// deployment; later code only ever UPDATEs it.
    async fn create_lock_table(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS run_lock (
                lock_key TEXT PRIMARY KEY,
                run_id TEXT,
                locked_at INTEGER,
                locked_by TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO run_lock (lock_key, run_id, locked_at, locked_by) VALUES (?, NULL, NULL, NULL)")
            .bind(LOCK_KEY)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
