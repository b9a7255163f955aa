//! External collaborators of the run coordinator.
//!
//! * [`JobClient`]: submit a pipeline job, poll its status. [`FabricJobClient`]
//!   implements it against the Fabric item-jobs API.
//! * [`ArtifactReader`]: read small result files by lakehouse path.
//!   [`OneLakeArtifactReader`] implements it against the OneLake DFS endpoint.
//!
//! Both are traits so the coordinator can be driven by in-process fakes.

pub mod artifacts;
mod client;
mod error;
mod fabric;
mod token;

pub use artifacts::{
    fetch_run_kpis, paths, ArtifactReader, FetchedArtifact, OneLakeArtifactReader, OneLakeSettings,
    DEFAULT_ARTIFACT_TIMEOUT, DEFAULT_DFS_BASE,
};
pub use client::{
    InputReference, JobClient, JobHandle, JobRequest, PipelineTarget, PollResult, RESTORE_MARKER,
};
pub use error::{ArtifactError, PollError, SubmissionError, TokenError, ERROR_BODY_LIMIT};
pub use fabric::{
    interpret_poll_response, FabricJobClient, FabricSettings, DEFAULT_API_BASE,
    DEFAULT_POLL_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT,
};
pub use token::{StaticToken, TokenSource};
