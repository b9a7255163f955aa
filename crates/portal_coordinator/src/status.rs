//! External job status vocabulary.

use portal_db::RunStatus;
use serde_json::Value;

/// Map a raw job-service status onto the run lifecycle.
///
/// Unrecognised values map to `Running`: an unknown status is treated as
/// "still going", never as terminal.
pub fn map_external_status(external: &str) -> RunStatus {
    match external {
        "NotStarted" => RunStatus::Queued,
        "InProgress" => RunStatus::Running,
        "Completed" => RunStatus::Succeeded,
        "Failed" | "Cancelled" | "Deduped" => RunStatus::Failed,
        _ => RunStatus::Running,
    }
}

/// Error message to store on a run that ended in `Failed`.
pub(crate) fn failure_reason(external: &str, body: &Value) -> String {
    body.pointer("/failureReason/message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Pipeline job ended with status {}", external))
}
