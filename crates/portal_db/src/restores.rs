//! Restore audit records.

use portal_ids::{RestoreId, RunId};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::RestoreRecord;
use crate::PortalDb;

impl PortalDb {
    /// Record a restore request. `target_run_id` is `None` when the restore
    /// run could not be submitted.
    pub async fn insert_restore(
        &self,
        id: &RestoreId,
        restored_by: &str,
        source_run_id: &RunId,
        target_run_id: Option<&RunId>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_restores (id, restored_at, restored_by, source_run_id, target_run_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(Self::now_millis())
        .bind(restored_by)
        .bind(source_run_id.as_str())
        .bind(target_run_id.map(RunId::as_str))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest restores first, at most `limit`.
    pub async fn list_restores(&self, limit: u32) -> Result<Vec<RestoreRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, restored_at, restored_by, source_run_id, target_run_id
            FROM run_restores
            ORDER BY restored_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let parse_run = |value: &str| {
            RunId::parse(value).map_err(|e| DbError::invalid_state(e.to_string()))
        };

        rows.iter()
            .map(|row| -> Result<RestoreRecord> {
                let id: String = row.try_get("id")?;
                let source: String = row.try_get("source_run_id")?;
                let target: Option<String> = row.try_get("target_run_id")?;
                Ok(RestoreRecord {
                    id: RestoreId::parse(&id).map_err(|e| DbError::invalid_state(e.to_string()))?,
                    restored_at: Self::millis_to_datetime(row.try_get("restored_at")?),
                    restored_by: row.try_get("restored_by")?,
                    source_run_id: parse_run(&source)?,
                    target_run_id: target.as_deref().map(parse_run).transpose()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewRun, RunStatus};

    async fn insert(db: &PortalDb, input: &str) -> RunId {
        let run_id = RunId::new();
        db.insert_run(&NewRun {
            run_id: run_id.clone(),
            triggered_by: "alice".into(),
            input_file: input.into(),
            workspace_id: "ws".into(),
            pipeline_item_id: "pipe".into(),
            external_job_handle: "h".into(),
            status: RunStatus::Submitted,
            app_version: None,
        })
        .await
        .unwrap();
        run_id
    }

    #[tokio::test]
    async fn test_restore_records_newest_first() {
        let db = PortalDb::open_memory().await.unwrap();
        let source = insert(&db, "orders.csv").await;
        let target = insert(&db, "__RESTORE__").await;

        let failed = RestoreId::new();
        db.insert_restore(&failed, "bob", &source, None).await.unwrap();
        let ok = RestoreId::new();
        db.insert_restore(&ok, "bob", &source, Some(&target))
            .await
            .unwrap();

        let records = db.list_restores(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, ok);
        assert_eq!(records[0].target_run_id.as_ref(), Some(&target));
        assert_eq!(records[1].id, failed);
        assert!(records[1].target_run_id.is_none());
        assert_eq!(records[1].source_run_id, source);

        assert_eq!(db.list_restores(1).await.unwrap().len(), 1);
    }
}
