//! Results of coordinator operations, including best-effort warnings.

use portal_db::{RunLockInfo, RunStatus};
use portal_ids::{RestoreId, RunId};
use portal_jobs::JobHandle;
use serde::Serialize;
use std::fmt;

/// Which piece of secondary bookkeeping failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The job was submitted but the run row was not written.
    RunNotPersisted,
    /// An audit event was not appended.
    EventNotRecorded,
    /// A status change was observed but not written.
    StatusNotPersisted,
    /// A terminal run's lock could not be released; force-release it.
    LockNotReleased,
    /// A restore attempt has no audit record.
    RestoreNotRecorded,
}

/// A failure that happened after the authoritative action succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A run was admitted: the lock is held and the job was submitted.
#[derive(Debug, Clone, Serialize)]
pub struct AdmitOutcome {
    pub run_id: RunId,
    pub job_handle: JobHandle,
    pub warnings: Vec<Warning>,
}

/// What one poll cycle did to the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Transition {
    Unchanged { status: RunStatus },
    Transitioned { from: RunStatus, to: RunStatus },
}

impl Transition {
    /// Status the run is in after the cycle, as far as this caller saw.
    pub fn status(&self) -> RunStatus {
        match self {
            Transition::Unchanged { status } => *status,
            Transition::Transitioned { to, .. } => *to,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Transition::Transitioned { .. })
    }
}

/// Result of one advance call.
#[derive(Debug, Clone, Serialize)]
pub struct AdvanceOutcome {
    pub run_id: RunId,
    pub transition: Transition,
    /// Raw status reported by the job service; `None` when it was not asked.
    pub external_status: Option<String>,
    pub kpis_captured: bool,
    pub lock_released: bool,
    pub warnings: Vec<Warning>,
}

impl AdvanceOutcome {
    pub(crate) fn unchanged(run_id: RunId, status: RunStatus, external: Option<String>) -> Self {
        Self {
            run_id,
            transition: Transition::Unchanged { status },
            external_status: external,
            kpis_captured: false,
            lock_released: false,
            warnings: Vec::new(),
        }
    }
}

/// A restore run was admitted and submitted.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub restore_id: RestoreId,
    pub source_run_id: RunId,
    pub target_run_id: RunId,
    pub job_handle: JobHandle,
    pub warnings: Vec<Warning>,
}

/// Result of an operator force-release.
#[derive(Debug, Clone, Serialize)]
pub struct ForceReleaseOutcome {
    /// Holder that was evicted; `None` if the lock was already free.
    pub evicted: Option<RunLockInfo>,
    pub warnings: Vec<Warning>,
}
