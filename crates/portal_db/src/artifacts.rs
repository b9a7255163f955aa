//! Artifacts registered against runs.

use portal_ids::{ArtifactId, RunId};
use sqlx::Row;
use tracing::debug;

use crate::error::{DbError, Result};
use crate::types::RunArtifact;
use crate::PortalDb;

impl PortalDb {
    /// Register a file produced by a run.
    pub async fn insert_artifact(
        &self,
        run_id: &RunId,
        artifact_type: &str,
        file_path: &str,
        file_size: Option<i64>,
    ) -> Result<ArtifactId> {
        let id = ArtifactId::new();
        sqlx::query(
            r#"
            INSERT INTO run_artifacts (id, run_id, artifact_type, file_path, file_size, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(run_id.as_str())
        .bind(artifact_type)
        .bind(file_path)
        .bind(file_size)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        debug!(run_id = %run_id, artifact_type, file_path, "Artifact registered");
        Ok(id)
    }

    /// Artifacts of a run in registration order.
    pub async fn list_artifacts(&self, run_id: &RunId) -> Result<Vec<RunArtifact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, artifact_type, file_path, file_size, created_at
            FROM run_artifacts
            WHERE run_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RunArtifact> {
                let id: String = row.try_get("id")?;
                Ok(RunArtifact {
                    id: ArtifactId::parse(&id).map_err(|e| DbError::invalid_state(e.to_string()))?,
                    run_id: run_id.clone(),
                    artifact_type: row.try_get("artifact_type")?,
                    file_path: row.try_get("file_path")?,
                    file_size: row.try_get("file_size")?,
                    created_at: Self::millis_to_datetime(row.try_get("created_at")?),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewRun, RunStatus};

    #[tokio::test]
    async fn test_register_and_list() {
        let db = PortalDb::open_memory().await.unwrap();
        let run_id = RunId::new();
        db.insert_run(&NewRun {
            run_id: run_id.clone(),
            triggered_by: "alice".into(),
            input_file: "orders.csv".into(),
            workspace_id: "ws".into(),
            pipeline_item_id: "pipe".into(),
            external_job_handle: "h".into(),
            status: RunStatus::Submitted,
            app_version: None,
        })
        .await
        .unwrap();

        db.insert_artifact(&run_id, "kpis", "Files/results/runs/x/kpis.json", Some(42))
            .await
            .unwrap();
        db.insert_artifact(&run_id, "metadata", "Files/results/runs/x/run_metadata.json", None)
            .await
            .unwrap();

        let artifacts = db.list_artifacts(&run_id).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].artifact_type, "kpis");
        assert_eq!(artifacts[0].file_size, Some(42));
        assert!(artifacts[1].file_size.is_none());
        assert!(db.list_artifacts(&RunId::new()).await.unwrap().is_empty());
    }
}
