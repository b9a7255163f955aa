//! The run lifecycle state machine.

use portal_db::{
    EventType, NewRun, PortalDb, RestoreRecord, Run, RunArtifact, RunEvent, RunLock, RunLockInfo,
    RunStats, RunStatus, RunUpdate,
};
use portal_ids::{RestoreId, RunId};
use portal_jobs::{
    fetch_run_kpis, paths, ArtifactReader, InputReference, JobClient, JobHandle, JobRequest,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{CoordinatorError, Result};
use crate::outcome::*;
use crate::status::{failure_reason, map_external_status};

/// Artifact type under which captured KPI files are registered.
pub const KPI_ARTIFACT_TYPE: &str = "kpis";

/// Drives runs through `SUBMITTED -> QUEUED -> RUNNING -> SUCCEEDED | FAILED`.
///
/// Holds no state of its own: every decision is made from a fresh store read
/// plus at most one job-service call. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    db: PortalDb,
    lock: RunLock,
    jobs: Arc<dyn JobClient>,
    artifacts: Arc<dyn ArtifactReader>,
    app_version: Option<String>,
}

/// A run whose job was submitted under a freshly acquired lock.
struct Launched {
    run_id: RunId,
    job_handle: JobHandle,
    warnings: Vec<Warning>,
}

impl Coordinator {
    pub fn new(db: PortalDb, jobs: Arc<dyn JobClient>, artifacts: Arc<dyn ArtifactReader>) -> Self {
        let lock = db.run_lock();
        Self {
            db,
            lock,
            jobs,
            artifacts,
            app_version: None,
        }
    }

    /// Version tag stamped on every run this coordinator creates.
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    pub fn db(&self) -> &PortalDb {
        &self.db
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit a new run for `input_file`.
    ///
    /// The lock is taken before anything else; losing that race aborts with
    /// [`CoordinatorError::LockContention`] and no job is submitted. A failed
    /// submission releases the lock again. Once the job is submitted the call
    /// succeeds even if the run row or its event could not be written.
    pub async fn admit(&self, input_file: &str, requested_by: &str) -> Result<AdmitOutcome> {
        if input_file.trim().is_empty() {
            return Err(CoordinatorError::InvalidRequest("input file is empty".into()));
        }
        let launched = self
            .launch(InputReference::file(input_file.trim()), requested_by)
            .await?;

        Ok(AdmitOutcome {
            run_id: launched.run_id,
            job_handle: launched.job_handle,
            warnings: launched.warnings,
        })
    }

    async fn launch(&self, input: InputReference, requested_by: &str) -> Result<Launched> {
        let requested_by = requested_by.trim();
        if requested_by.is_empty() {
            return Err(CoordinatorError::InvalidRequest("requester is empty".into()));
        }

        let run_id = RunId::new();
        if !self.lock.acquire(&run_id, requested_by).await? {
            // Holder lookup is informational only.
            let holder = self.lock.check().await.ok().flatten();
            info!(run_id = %run_id, "Admission refused: lock held");
            return Err(CoordinatorError::LockContention { holder });
        }

        let request = JobRequest {
            run_id: run_id.clone(),
            input: input.clone(),
            requested_by: requested_by.to_string(),
        };
        let job_handle = match self.jobs.submit(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Pipeline submission failed");
                if let Err(release_err) = self.lock.release(&run_id).await {
                    warn!(run_id = %run_id, error = %release_err, "Failed to release lock after submission failure");
                }
                return Err(e.into());
            }
        };

        let mut warnings = Vec::new();
        let target = self.jobs.target();
        let new_run = NewRun {
            run_id: run_id.clone(),
            triggered_by: requested_by.to_string(),
            input_file: input.input_file().to_string(),
            workspace_id: target.workspace_id,
            pipeline_item_id: target.pipeline_item_id,
            external_job_handle: job_handle.as_str().to_string(),
            status: RunStatus::Submitted,
            app_version: self.app_version.clone(),
        };

        match self.db.insert_run(&new_run).await {
            Ok(()) => {
                let message = match input.restore_source() {
                    Some(source) => {
                        format!("Restore of run {} submitted by {}", source, requested_by)
                    }
                    None => format!(
                        "Pipeline submitted by {} for file {}",
                        requested_by,
                        input.input_file()
                    ),
                };
                self.record_event(&run_id, EventType::StatusChange, &message, &mut warnings)
                    .await;
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Job submitted but run was not recorded");
                warnings.push(Warning::new(
                    WarningKind::RunNotPersisted,
                    format!(
                        "Pipeline was triggered but failed to log to the database: {}. The pipeline is running.",
                        e
                    ),
                ));
            }
        }

        info!(run_id = %run_id, input = input.input_file(), requested_by, "Run admitted");
        Ok(Launched {
            run_id,
            job_handle,
            warnings,
        })
    }

    // ------------------------------------------------------------------
    // Poll cycle
    // ------------------------------------------------------------------

    /// Poll the job behind `run_id` once and fold the answer into the store.
    ///
    /// Safe to call concurrently for the same run: the status write is
    /// guarded by the status this caller read, so only one caller records a
    /// given transition and releases the lock.
    pub async fn advance(&self, run_id: &RunId) -> Result<AdvanceOutcome> {
        let run = self
            .db
            .get_run(run_id)
            .await?
            .ok_or_else(|| CoordinatorError::RunNotFound(run_id.clone()))?;

        if run.status.is_terminal() {
            debug!(run_id = %run_id, status = %run.status, "Run already terminal; not polling");
            return Ok(AdvanceOutcome::unchanged(run_id.clone(), run.status, None));
        }
        if run.external_job_handle.trim().is_empty() {
            return Err(CoordinatorError::MissingJobHandle(run_id.clone()));
        }

        let poll = match self.jobs.poll(&run.external_job_handle).await {
            Ok(poll) => poll,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Polling failed");
                if let Err(event_err) = self
                    .db
                    .append_event(run_id, EventType::Error, &format!("Poll error: {}", e))
                    .await
                {
                    warn!(run_id = %run_id, error = %event_err, "Failed to record poll error");
                }
                return Err(e.into());
            }
        };

        let old = run.status;
        let new = map_external_status(&poll.status);
        if new == old {
            debug!(run_id = %run_id, status = %old, external = %poll.status, "Status unchanged");
            return Ok(AdvanceOutcome::unchanged(run_id.clone(), old, Some(poll.status)));
        }

        let error_message = (new == RunStatus::Failed).then(|| failure_reason(&poll.status, &poll.body));
        let update = RunUpdate::status(new)
            .with_external_job_id(poll.job_id.clone())
            .with_error_message(error_message);

        let mut warnings = Vec::new();
        match self.db.transition_run(run_id, old, &update).await {
            Ok(true) => {}
            Ok(false) => {
                // Another caller got there first and owns the follow-up work.
                let current = self
                    .db
                    .get_run(run_id)
                    .await
                    .ok()
                    .flatten()
                    .map_or(new, |r| r.status);
                debug!(run_id = %run_id, status = %current, "Transition already applied");
                return Ok(AdvanceOutcome::unchanged(run_id.clone(), current, Some(poll.status)));
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Status change not persisted");
                warnings.push(Warning::new(
                    WarningKind::StatusNotPersisted,
                    format!("Status changed to {} but failed to update the database: {}", new, e),
                ));
            }
        }

        info!(run_id = %run_id, from = %old, to = %new, external = %poll.status, "Run status changed");
        self.record_event(
            run_id,
            EventType::StatusChange,
            &format!("Status changed: {} -> {} (Fabric: {})", old, new, poll.status),
            &mut warnings,
        )
        .await;

        let kpis_captured = if new == RunStatus::Succeeded {
            self.capture_kpis(run_id).await
        } else {
            false
        };

        let mut lock_released = false;
        if new.is_terminal() {
            match self.lock.release(run_id).await {
                Ok(true) => {
                    lock_released = true;
                    self.record_event(
                        run_id,
                        EventType::Log,
                        &format!("Pipeline lock released. Final status: {}", new),
                        &mut warnings,
                    )
                    .await;
                }
                Ok(false) => {
                    debug!(run_id = %run_id, "Lock not held by this run; nothing to release");
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Failed to release lock");
                    warnings.push(Warning::new(
                        WarningKind::LockNotReleased,
                        format!("Failed to release lock: {}", e),
                    ));
                }
            }
        }

        Ok(AdvanceOutcome {
            run_id: run_id.clone(),
            transition: Transition::Transitioned { from: old, to: new },
            external_status: Some(poll.status),
            kpis_captured,
            lock_released,
            warnings,
        })
    }

    /// Advance whichever run is currently active, if any.
    pub async fn advance_active(&self) -> Result<Option<AdvanceOutcome>> {
        match self.db.get_active_run().await? {
            Some(run) => Ok(Some(self.advance(&run.run_id).await?)),
            None => Ok(None),
        }
    }

    /// Best-effort: fetch the KPI artifact and cache it on the run.
    async fn capture_kpis(&self, run_id: &RunId) -> bool {
        let fetched = match fetch_run_kpis(self.artifacts.as_ref(), run_id).await {
            Ok(Some(fetched)) => fetched,
            Ok(None) => {
                debug!(run_id = %run_id, "No KPI artifact found");
                return false;
            }
            Err(e) => {
                debug!(run_id = %run_id, error = %e, "KPI fetch failed");
                return false;
            }
        };

        if let Err(e) = self.db.update_run(run_id, &RunUpdate::kpis(fetched.value)).await {
            debug!(run_id = %run_id, error = %e, "KPI snapshot not persisted");
            return false;
        }
        let size = i64::try_from(fetched.size).ok();
        if let Err(e) = self
            .db
            .insert_artifact(run_id, KPI_ARTIFACT_TYPE, &fetched.path, size)
            .await
        {
            debug!(run_id = %run_id, error = %e, "KPI artifact not registered");
        }
        true
    }

    // ------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------

    /// Promote the outputs of a successful run to "current".
    ///
    /// The restore runs as a new tracked run and goes through admission like
    /// any other. Every attempt that reaches the job service leaves a restore
    /// record, including failed submissions.
    pub async fn restore(&self, source_run_id: &RunId, requested_by: &str) -> Result<RestoreOutcome> {
        let source = self
            .db
            .get_run(source_run_id)
            .await?
            .ok_or_else(|| CoordinatorError::RunNotFound(source_run_id.clone()))?;
        if source.status != RunStatus::Succeeded {
            return Err(CoordinatorError::RestoreRefused {
                run_id: source_run_id.clone(),
                status: source.status,
            });
        }

        let restore_id = RestoreId::new();
        let input = InputReference::Restore {
            source_run_id: source_run_id.clone(),
        };
        let requested_by = requested_by.trim();

        let launched = match self.launch(input, requested_by).await {
            Ok(launched) => launched,
            Err(CoordinatorError::Submission(e)) => {
                self.record_failed_restore(&restore_id, source_run_id, requested_by, &e.to_string())
                    .await;
                return Err(CoordinatorError::Submission(e));
            }
            Err(other) => return Err(other),
        };

        let mut warnings = launched.warnings;
        let target_persisted = !warnings
            .iter()
            .any(|w| w.kind == WarningKind::RunNotPersisted);
        let mut recorded = self
            .db
            .insert_restore(&restore_id, requested_by, source_run_id, Some(&launched.run_id))
            .await;
        if recorded.is_err() && !target_persisted {
            // The target row is missing, so the link cannot be stored; keep the attempt.
            debug!(restore_id = %restore_id, "Recording restore without its unpersisted target run");
            recorded = self
                .db
                .insert_restore(&restore_id, requested_by, source_run_id, None)
                .await;
        }
        if let Err(e) = recorded {
            warn!(restore_id = %restore_id, error = %e, "Restore record not written");
            warnings.push(Warning::new(
                WarningKind::RestoreNotRecorded,
                format!("Restore submitted but not recorded: {}", e),
            ));
        }
        self.record_event(
            source_run_id,
            EventType::Log,
            &format!(
                "Restore requested by {} as run {}",
                requested_by, launched.run_id
            ),
            &mut warnings,
        )
        .await;

        info!(restore_id = %restore_id, source = %source_run_id, target = %launched.run_id, "Restore submitted");
        Ok(RestoreOutcome {
            restore_id,
            source_run_id: source_run_id.clone(),
            target_run_id: launched.run_id,
            job_handle: launched.job_handle,
            warnings,
        })
    }

    async fn record_failed_restore(
        &self,
        restore_id: &RestoreId,
        source_run_id: &RunId,
        requested_by: &str,
        reason: &str,
    ) {
        if let Err(e) = self
            .db
            .insert_restore(restore_id, requested_by, source_run_id, None)
            .await
        {
            warn!(restore_id = %restore_id, error = %e, "Failed restore attempt not recorded");
        }
        if let Err(e) = self
            .db
            .append_event(
                source_run_id,
                EventType::Warning,
                &format!("Restore requested by {} failed: {}", requested_by, reason),
            )
            .await
        {
            warn!(run_id = %source_run_id, error = %e, "Restore warning event not recorded");
        }
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Clear the lock regardless of holder, for recovery from a run that
    /// will never reach a terminal status.
    pub async fn force_release(&self, operator: &str) -> Result<ForceReleaseOutcome> {
        let evicted = self.lock.force_release().await?;
        let mut warnings = Vec::new();

        if let Some(info) = &evicted {
            warn!(run_id = %info.run_id, operator, "Lock force-released");
            self.record_event(
                &info.run_id,
                EventType::Warning,
                &format!("Pipeline lock force-released by {}", operator),
                &mut warnings,
            )
            .await;
        }

        Ok(ForceReleaseOutcome { evicted, warnings })
    }

    async fn record_event(
        &self,
        run_id: &RunId,
        event_type: EventType,
        message: &str,
        warnings: &mut Vec<Warning>,
    ) {
        if let Err(e) = self.db.append_event(run_id, event_type, message).await {
            warn!(run_id = %run_id, event_type = %event_type, error = %e, "Event not recorded");
            warnings.push(Warning::new(
                WarningKind::EventNotRecorded,
                format!("Failed to record {} event: {}", event_type, e),
            ));
        }
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self.lock.is_held().await?)
    }

    pub async fn lock_status(&self) -> Result<Option<RunLockInfo>> {
        Ok(self.lock.check().await?)
    }

    pub async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>> {
        Ok(self.db.get_run(run_id).await?)
    }

    pub async fn get_active_run(&self) -> Result<Option<Run>> {
        Ok(self.db.get_active_run().await?)
    }

    pub async fn latest_successful_run(&self) -> Result<Option<Run>> {
        Ok(self.db.get_latest_successful_run().await?)
    }

    pub async fn list_runs(&self, limit: u32) -> Result<Vec<Run>> {
        Ok(self.db.list_runs(limit).await?)
    }

    pub async fn run_stats(&self) -> Result<RunStats> {
        Ok(self.db.run_stats().await?)
    }

    pub async fn get_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>> {
        Ok(self.db.get_events(run_id).await?)
    }

    pub async fn list_restores(&self, limit: u32) -> Result<Vec<RestoreRecord>> {
        Ok(self.db.list_restores(limit).await?)
    }

    pub async fn list_artifacts(&self, run_id: &RunId) -> Result<Vec<RunArtifact>> {
        Ok(self.db.list_artifacts(run_id).await?)
    }

    /// KPI snapshot of a run: the cached copy, else the run's own artifact.
    pub async fn run_kpis(&self, run_id: &RunId) -> Result<Option<serde_json::Value>> {
        let run = self
            .db
            .get_run(run_id)
            .await?
            .ok_or_else(|| CoordinatorError::RunNotFound(run_id.clone()))?;
        if let Some(kpis) = run.kpis {
            return Ok(Some(kpis));
        }
        Ok(self.artifacts.read_json(&paths::run_kpis(run_id)).await?)
    }
}
