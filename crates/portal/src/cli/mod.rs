//! CLI module for the Fabric portal
//!
//! Each operator command lives in its own module with an `Args` struct and
//! a `run` entry point. Every command supports `--json`.

pub mod config;
pub mod context;
pub mod error;
pub mod output;

pub mod refresh;
pub mod restore;
pub mod runs;
pub mod status;
pub mod submit;
pub mod unlock;

use crate::cli::error::HelpfulError;
use portal_ids::RunId;

/// Parse a run id argument.
pub fn parse_run_id(value: &str) -> Result<RunId, HelpfulError> {
    RunId::parse(value.trim()).map_err(|_| HelpfulError::invalid_run_id(value))
}
