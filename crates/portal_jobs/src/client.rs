//! The job service contract.

use async_trait::async_trait;
use portal_ids::RunId;
use serde::Serialize;

use crate::error::{PollError, SubmissionError};

/// `input_file` value carried by restore submissions.
pub const RESTORE_MARKER: &str = "__RESTORE__";

/// What a job is asked to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputReference {
    /// Ingest a file previously uploaded to the lakehouse.
    File(String),
    /// Re-publish the outputs of an earlier successful run as current.
    Restore { source_run_id: RunId },
}

impl InputReference {
    pub fn file(name: impl Into<String>) -> Self {
        Self::File(name.into())
    }

    /// The value stored as the run's input and sent as `input_file`.
    pub fn input_file(&self) -> &str {
        match self {
            InputReference::File(name) => name,
            InputReference::Restore { .. } => RESTORE_MARKER,
        }
    }

    pub fn restore_source(&self) -> Option<&RunId> {
        match self {
            InputReference::File(_) => None,
            InputReference::Restore { source_run_id } => Some(source_run_id),
        }
    }
}

/// One job submission. `run_id` travels with the job as its correlation id.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub run_id: RunId,
    pub input: InputReference,
    pub requested_by: String,
}

/// Opaque polling handle returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<JobHandle> for String {
    fn from(handle: JobHandle) -> Self {
        handle.0
    }
}

/// A single point-in-time observation of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    /// Raw status string reported by the service.
    pub status: String,
    /// The service's own id for the job, when the body carries one.
    pub job_id: Option<String>,
    /// HTTP status of the poll response.
    pub http_status: u16,
    /// Full response body (`Null` when absent or not JSON).
    pub body: serde_json::Value,
}

/// Where jobs are submitted to. Stored on every run for traceability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineTarget {
    pub workspace_id: String,
    pub pipeline_item_id: String,
}

/// Submits pipeline jobs and reports their status.
///
/// Implementations must be cheap to share; the coordinator holds one behind
/// an `Arc` and calls it from whatever task is handling a request.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// The pipeline this client submits to.
    fn target(&self) -> PipelineTarget;

    /// Start a job. Not idempotent: every successful call starts a new job.
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, SubmissionError>;

    /// Query the job behind `handle` once. Repeated polls are expected.
    async fn poll(&self, handle: &str) -> Result<PollResult, PollError>;
}
