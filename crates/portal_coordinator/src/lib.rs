//! Run lifecycle coordination for the Fabric portal.
//!
//! [`Coordinator`] owns every invariant of the run lifecycle: it admits runs
//! under the single-slot [`RunLock`](portal_db::RunLock), advances them one
//! poll at a time, and records restores. The store and the job service are
//! passive collaborators.
//!
//! Failures come in two kinds. An `Err(CoordinatorError)` means the primary
//! action (acquire, submit, poll) did not happen. A [`Warning`] on an `Ok`
//! outcome means the primary action happened but some bookkeeping after it
//! did not; nothing is rolled back.

mod coordinator;
mod error;
mod outcome;
mod status;

pub use coordinator::{Coordinator, KPI_ARTIFACT_TYPE};
pub use error::{CoordinatorError, Result};
pub use outcome::{
    AdmitOutcome, AdvanceOutcome, ForceReleaseOutcome, RestoreOutcome, Transition, Warning,
    WarningKind,
};
pub use status::map_external_status;
