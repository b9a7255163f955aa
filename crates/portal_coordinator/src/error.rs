//! Authoritative failures of coordinator operations.

use portal_db::{DbError, RunLockInfo, RunStatus};
use portal_ids::RunId;
use portal_jobs::{ArtifactError, PollError, SubmissionError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// The primary action of an operation did not happen.
///
/// Secondary bookkeeping failures are not errors; they are reported as
/// [`Warning`](crate::Warning)s on a successful outcome.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Another run holds the admission slot. Nothing was submitted.
    #[error("A pipeline run is already in progress{}", describe_holder(.holder))]
    LockContention { holder: Option<RunLockInfo> },

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Run {0} has no job handle; it cannot be polled")]
    MissingJobHandle(RunId),

    #[error("Run {run_id} is {status}; only SUCCEEDED runs can be restored")]
    RestoreRefused { run_id: RunId, status: RunStatus },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn describe_holder(holder: &Option<RunLockInfo>) -> String {
    match holder {
        Some(info) => match &info.locked_by {
            Some(by) => format!(" (run {} started by {})", info.run_id, by),
            None => format!(" (run {})", info.run_id),
        },
        None => String::new(),
    }
}

impl CoordinatorError {
    /// True for the expected "someone else is running" outcome.
    pub fn is_contention(&self) -> bool {
        matches!(self, CoordinatorError::LockContention { .. })
    }
}
