//! Run records.

use portal_ids::RunId;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use crate::error::{DbError, Result};
use crate::types::*;
use crate::PortalDb;

const RUN_COLUMNS: &str = "run_id, created_at, started_at, finished_at, triggered_by, input_file, \
     workspace_id, pipeline_item_id, status, error_message, external_job_handle, external_job_id, \
     kpis, app_version";

impl PortalDb {
    /// Insert a new run row.
    pub async fn insert_run(&self, run: &NewRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs
                (run_id, created_at, triggered_by, input_file, workspace_id,
                 pipeline_item_id, status, external_job_handle, app_version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.run_id.as_str())
        .bind(Self::now_millis())
        .bind(&run.triggered_by)
        .bind(&run.input_file)
        .bind(&run.workspace_id)
        .bind(&run.pipeline_item_id)
        .bind(run.status.as_str())
        .bind(&run.external_job_handle)
        .bind(&run.app_version)
        .execute(&self.pool)
        .await?;

        debug!(run_id = %run.run_id, status = %run.status, "Run inserted");
        Ok(())
    }

    /// Apply a partial update. Returns `false` if the run does not exist or
    /// the update is empty.
    pub async fn update_run(&self, run_id: &RunId, update: &RunUpdate) -> Result<bool> {
        self.apply_run_update(run_id, None, update).await
    }

    /// Apply a partial update only while the run is still in `expected`.
    ///
    /// This is the status compare-and-set used by the poll cycle: when two
    /// callers observe the same external change, only the first write
    /// matches and the second sees `false`.
    pub async fn transition_run(
        &self,
        run_id: &RunId,
        expected: RunStatus,
        update: &RunUpdate,
    ) -> Result<bool> {
        self.apply_run_update(run_id, Some(expected), update).await
    }

    async fn apply_run_update(
        &self,
        run_id: &RunId,
        expected: Option<RunStatus>,
        update: &RunUpdate,
    ) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let now = Self::now_millis();
        let kpis = update.kpis.as_ref().map(serde_json::to_string).transpose()?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE runs SET ");
        let mut sets = qb.separated(", ");

        if let Some(status) = update.status {
            sets.push("status = ").push_bind_unseparated(status.as_str());
            // Derived timestamps are write-once.
            if status == RunStatus::Running {
                sets.push("started_at = COALESCE(started_at, ")
                    .push_bind_unseparated(now)
                    .push_unseparated(")");
            }
            if status.is_terminal() {
                sets.push("finished_at = COALESCE(finished_at, ")
                    .push_bind_unseparated(now)
                    .push_unseparated(")");
            }
        }
        if let Some(message) = &update.error_message {
            sets.push("error_message = ").push_bind_unseparated(message.clone());
        }
        if let Some(job_id) = &update.external_job_id {
            sets.push("external_job_id = ").push_bind_unseparated(job_id.clone());
        }
        if let Some(kpis) = kpis {
            sets.push("kpis = ").push_bind_unseparated(kpis);
        }

        qb.push(" WHERE run_id = ").push_bind(run_id.as_str());
        if let Some(expected) = expected {
            qb.push(" AND status = ").push_bind(expected.as_str());
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    /// Get a run by id.
    pub async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?");
        let row = sqlx::query(&sql)
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_run).transpose()
    }

    /// The run currently in a non-terminal status (newest if, against the
    /// lock's guarantee, there are several).
    pub async fn get_active_run(&self) -> Result<Option<Run>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE status IN ('SUBMITTED', 'QUEUED', 'RUNNING') \
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_run).transpose()
    }

    /// The most recently finished successful run.
    pub async fn get_latest_successful_run(&self) -> Result<Option<Run>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE status = 'SUCCEEDED' \
             ORDER BY finished_at DESC, rowid DESC LIMIT 1"
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_run).transpose()
    }

    /// Newest runs first, at most `limit`.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<Run>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC, rowid DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_run).collect()
    }

    /// Run counts per status.
    pub async fn run_stats(&self) -> Result<RunStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status = 'SUBMITTED' THEN 1 ELSE 0 END), 0) as submitted,
                COALESCE(SUM(CASE WHEN status = 'QUEUED' THEN 1 ELSE 0 END), 0) as queued,
                COALESCE(SUM(CASE WHEN status = 'RUNNING' THEN 1 ELSE 0 END), 0) as running,
                COALESCE(SUM(CASE WHEN status = 'SUCCEEDED' THEN 1 ELSE 0 END), 0) as succeeded,
                COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0) as failed
            FROM runs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |name: &str| -> Result<u64> {
            let value: i64 = row.try_get(name)?;
            Ok(u64::try_from(value).unwrap_or(0))
        };

        Ok(RunStats {
            total: count("total")?,
            submitted: count("submitted")?,
            queued: count("queued")?,
            running: count("running")?,
            succeeded: count("succeeded")?,
            failed: count("failed")?,
        })
    }
}

fn row_to_run(row: &SqliteRow) -> Result<Run> {
    let run_id: String = row.try_get("run_id")?;
    let run_id = RunId::parse(&run_id).map_err(|e| DbError::invalid_state(e.to_string()))?;

    let status_str: String = row.try_get("status")?;
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown run status: {}", status_str)))?;

    let kpis: Option<String> = row.try_get("kpis")?;
    let kpis = kpis.as_deref().map(serde_json::from_str).transpose()?;

    let started_at: Option<i64> = row.try_get("started_at")?;
    let finished_at: Option<i64> = row.try_get("finished_at")?;

    Ok(Run {
        run_id,
        created_at: PortalDb::millis_to_datetime(row.try_get("created_at")?),
        started_at: started_at.map(PortalDb::millis_to_datetime),
        finished_at: finished_at.map(PortalDb::millis_to_datetime),
        triggered_by: row.try_get("triggered_by")?,
        input_file: row.try_get("input_file")?,
        workspace_id: row.try_get("workspace_id")?,
        pipeline_item_id: row.try_get("pipeline_item_id")?,
        status,
        error_message: row.try_get("error_message")?,
        external_job_handle: row.try_get("external_job_handle")?,
        external_job_id: row.try_get("external_job_id")?,
        kpis,
        app_version: row.try_get("app_version")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_run(input: &str) -> NewRun {
        NewRun {
            run_id: RunId::new(),
            triggered_by: "alice".to_string(),
            input_file: input.to_string(),
            workspace_id: "ws".to_string(),
            pipeline_item_id: "pipe".to_string(),
            external_job_handle: "https://jobs.example/1".to_string(),
            status: RunStatus::Submitted,
            app_version: Some("1.0.0".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = PortalDb::open_memory().await.unwrap();
        let run = new_run("orders.csv");
        db.insert_run(&run).await.unwrap();

        let stored = db.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Submitted);
        assert_eq!(stored.input_file, "orders.csv");
        assert_eq!(stored.external_job_handle, "https://jobs.example/1");
        assert!(stored.started_at.is_none());
        assert!(stored.finished_at.is_none());
        assert!(stored.kpis.is_none());

        assert!(db.get_run(&RunId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_only_touches_supplied_fields() {
        let db = PortalDb::open_memory().await.unwrap();
        let run = new_run("orders.csv");
        db.insert_run(&run).await.unwrap();

        let update = RunUpdate::default().with_external_job_id(Some("job-7".into()));
        assert!(db.update_run(&run.run_id, &update).await.unwrap());

        let stored = db.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.external_job_id.as_deref(), Some("job-7"));
        assert_eq!(stored.status, RunStatus::Submitted);
        assert!(stored.error_message.is_none());

        assert!(!db.update_run(&run.run_id, &RunUpdate::default()).await.unwrap());
        assert!(!db.update_run(&RunId::new(), &update).await.unwrap());
    }

    #[tokio::test]
    async fn test_kpis_stored_as_opaque_json() {
        let db = PortalDb::open_memory().await.unwrap();
        let run = new_run("orders.csv");
        db.insert_run(&run).await.unwrap();

        let kpis = serde_json::json!({"orders": 12, "breakdowns": {"region": {"EU": 3.5}}});
        db.update_run(&run.run_id, &RunUpdate::kpis(kpis.clone())).await.unwrap();

        let stored = db.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(stored.kpis, Some(kpis));
    }

    #[tokio::test]
    async fn test_transition_is_status_guarded() {
        let db = PortalDb::open_memory().await.unwrap();
        let run = new_run("orders.csv");
        db.insert_run(&run).await.unwrap();

        let to_running = RunUpdate::status(RunStatus::Running);
        assert!(db
            .transition_run(&run.run_id, RunStatus::Submitted, &to_running)
            .await
            .unwrap());
        assert!(!db
            .transition_run(&run.run_id, RunStatus::Submitted, &to_running)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_active_and_latest_successful() {
        let db = PortalDb::open_memory().await.unwrap();
        assert!(db.get_active_run().await.unwrap().is_none());

        let done = new_run("a.csv");
        db.insert_run(&done).await.unwrap();
        db.update_run(&done.run_id, &RunUpdate::status(RunStatus::Succeeded))
            .await
            .unwrap();

        let active = new_run("b.csv");
        db.insert_run(&active).await.unwrap();
        db.update_run(&active.run_id, &RunUpdate::status(RunStatus::Queued))
            .await
            .unwrap();

        assert_eq!(db.get_active_run().await.unwrap().unwrap().run_id, active.run_id);
        assert_eq!(
            db.get_latest_successful_run().await.unwrap().unwrap().run_id,
            done.run_id
        );
    }

    #[tokio::test]
    async fn test_list_runs_newest_first_and_bounded() {
        let db = PortalDb::open_memory().await.unwrap();
        let mut ids = Vec::new();
        for i in 0..4 {
            let run = new_run(&format!("{}.csv", i));
            db.insert_run(&run).await.unwrap();
            ids.push(run.run_id);
        }

        let listed = db.list_runs(3).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].run_id, ids[3]);
        assert_eq!(listed[2].run_id, ids[1]);

        let stats = db.run_stats().await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.submitted, 4);
        assert_eq!(stats.failed, 0);
    }
}
