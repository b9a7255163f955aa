//! Domain types persisted by the metadata store.

use chrono::{DateTime, Utc};
use portal_ids::{ArtifactId, EventId, RestoreId, RunId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Runs
// ============================================================================

/// Lifecycle status of a run.
///
/// `Submitted`, `Queued` and `Running` are active; `Succeeded` and `Failed`
/// are terminal and never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Submitted,
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Statuses that count as "the active run".
    pub const ACTIVE: [RunStatus; 3] = [RunStatus::Submitted, RunStatus::Queued, RunStatus::Running];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Submitted => "SUBMITTED",
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Some(RunStatus::Submitted),
            "QUEUED" => Some(RunStatus::Queued),
            "RUNNING" => Some(RunStatus::Running),
            "SUCCEEDED" => Some(RunStatus::Succeeded),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown run status: {}", s))
    }
}

/// One end-to-end execution of the external pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub triggered_by: String,
    /// Input file name, or the restore marker for restore runs.
    pub input_file: String,
    pub workspace_id: String,
    pub pipeline_item_id: String,
    pub status: RunStatus,
    pub error_message: Option<String>,
    /// Opaque polling handle returned by the job service.
    pub external_job_handle: String,
    pub external_job_id: Option<String>,
    /// KPI snapshot; opaque JSON.
    pub kpis: Option<serde_json::Value>,
    pub app_version: Option<String>,
}

/// Fields for inserting a run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub run_id: RunId,
    pub triggered_by: String,
    pub input_file: String,
    pub workspace_id: String,
    pub pipeline_item_id: String,
    pub external_job_handle: String,
    pub status: RunStatus,
    pub app_version: Option<String>,
}

/// Partial update of a run. Only `Some` fields are written.
///
/// Setting `status` also maintains the derived timestamps: `started_at` on the
/// first entry into `Running`, `finished_at` on the first entry into a
/// terminal status. Neither is ever overwritten once set.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub error_message: Option<String>,
    pub external_job_id: Option<String>,
    pub kpis: Option<serde_json::Value>,
}

impl RunUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn kpis(kpis: serde_json::Value) -> Self {
        Self {
            kpis: Some(kpis),
            ..Self::default()
        }
    }

    pub fn with_external_job_id(mut self, job_id: Option<String>) -> Self {
        self.external_job_id = job_id;
        self
    }

    pub fn with_error_message(mut self, message: Option<String>) -> Self {
        self.error_message = message;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.error_message.is_none()
            && self.external_job_id.is_none()
            && self.kpis.is_none()
    }
}

/// Run counts per status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub total: u64,
    pub submitted: u64,
    pub queued: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
}

// ============================================================================
// Events
// ============================================================================

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    StatusChange,
    Warning,
    Error,
    Log,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StatusChange => "STATUS_CHANGE",
            EventType::Warning => "WARNING",
            EventType::Error => "ERROR",
            EventType::Log => "LOG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STATUS_CHANGE" => Some(EventType::StatusChange),
            "WARNING" => Some(EventType::Warning),
            "ERROR" => Some(EventType::Error),
            "LOG" => Some(EventType::Log),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable audit trail entry for a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub id: EventId,
    pub run_id: RunId,
    pub event_time: DateTime<Utc>,
    pub event_type: EventType,
    pub message: String,
}

// ============================================================================
// Lock
// ============================================================================

/// Current holder of the admission slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLockInfo {
    pub run_id: RunId,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
}

// ============================================================================
// Restores & artifacts
// ============================================================================

/// Audit record of a "promote this run's output to current" request.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreRecord {
    pub id: RestoreId,
    pub restored_at: DateTime<Utc>,
    pub restored_by: String,
    pub source_run_id: RunId,
    /// Run spawned to perform the restore; `None` when submission failed.
    pub target_run_id: Option<RunId>,
}

/// A file produced by a run, registered by path.
#[derive(Debug, Clone, Serialize)]
pub struct RunArtifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub artifact_type: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_classes() {
        for status in [
            RunStatus::Submitted,
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
            assert_ne!(status.is_active(), status.is_terminal());
        }
        assert!(RunStatus::ACTIVE.iter().all(RunStatus::is_active));
        assert_eq!("running".parse::<RunStatus>(), Ok(RunStatus::Running));
        assert!("CANCELLED".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_empty_update() {
        assert!(RunUpdate::default().is_empty());
        assert!(!RunUpdate::status(RunStatus::Queued).is_empty());
        assert!(!RunUpdate::default()
            .with_external_job_id(Some("job".into()))
            .is_empty());
    }
}
