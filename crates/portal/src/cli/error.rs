//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use portal_coordinator::CoordinatorError;
use portal_db::RunLockInfo;
use std::fmt;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Required settings are absent
    pub fn missing_config(keys: &[&str], action: &str) -> Self {
        Self::new(format!("Missing configuration: {}", keys.join(", ")))
            .with_context(format!("These settings are required to {}", action))
            .with_suggestions([
                "TRY: Export them as environment variables".to_string(),
                "TRY: Add them to config.toml in the portal home".to_string(),
                "TRY: portal config   # show what is currently resolved".to_string(),
            ])
    }

    /// Run id argument does not parse
    pub fn invalid_run_id(value: &str) -> Self {
        Self::new(format!("Invalid run id: '{}'", value))
            .with_context("Run ids are UUIDs, e.g. 0b5b8f0e-4c1e-4a57-9d4b-3f8a1f0c2d11")
            .with_suggestion("TRY: portal runs   # list recent runs and their ids")
    }

    /// The metadata store cannot be opened
    pub fn store_unavailable(url: &str, details: &str) -> Self {
        Self::new("Failed to open the metadata store")
            .with_context(format!("Database: {}", url))
            .with_suggestions([
                format!("Error: {}", details),
                "TRY: Check file permissions on the portal home".to_string(),
                "TRY: Set PORTAL_DATABASE_URL to a writable sqlite: URL".to_string(),
            ])
    }

    /// Admission slot is taken
    pub fn lock_held(holder: Option<&RunLockInfo>) -> Self {
        let context = match holder {
            Some(info) => format!(
                "Run {} holds the pipeline lock (started by {})",
                info.run_id,
                info.locked_by.as_deref().unwrap_or("unknown")
            ),
            None => "The pipeline lock is held by another run".to_string(),
        };
        Self::new("A pipeline run is already in progress")
            .with_context(context)
            .with_suggestions([
                "TRY: portal refresh   # poll the active run".to_string(),
                "TRY: portal unlock --by <you>   # only if the run is known to be dead".to_string(),
            ])
    }

    /// Translate a coordinator failure for the operator.
    pub fn from_coordinator(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::LockContention { holder } => Self::lock_held(holder.as_ref()),
            CoordinatorError::RunNotFound(run_id) => {
                Self::new(format!("Run not found: {}", run_id))
                    .with_suggestion("TRY: portal runs   # list recent runs")
            }
            CoordinatorError::MissingJobHandle(run_id) => {
                Self::new(format!("Run {} has no job handle", run_id))
                    .with_context("The job was submitted but its polling location was never recorded")
                    .with_suggestion("TRY: Check the run in the Fabric monitoring hub, then: portal unlock --by <you>")
            }
            CoordinatorError::RestoreRefused { run_id, status } => {
                Self::new(format!("Cannot restore run {}", run_id))
                    .with_context(format!("Run is {}; only SUCCEEDED runs can be restored", status))
            }
            CoordinatorError::Submission(e) => Self::new("Pipeline trigger failed")
                .with_context(e.to_string())
                .with_suggestion("TRY: Check that FABRIC_ACCESS_TOKEN is valid and not expired"),
            CoordinatorError::Poll(e) => Self::new("Polling failed")
                .with_context(e.to_string())
                .with_suggestion("TRY: Run portal refresh again; the run's status was not changed"),
            CoordinatorError::Store(e) => Self::new("Metadata store error").with_context(e.to_string()),
            CoordinatorError::Artifact(e) => Self::new("Artifact read failed")
                .with_context(e.to_string())
                .with_suggestion("TRY: Check that FABRIC_STORAGE_TOKEN is valid"),
            CoordinatorError::InvalidRequest(msg) => Self::new(format!("Invalid request: {}", msg)),
        }
    }
}

impl From<CoordinatorError> for HelpfulError {
    fn from(err: CoordinatorError) -> Self {
        Self::from_coordinator(err)
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print an error as a JSON object on stdout, for `--json` callers.
pub fn print_json_error(err: &anyhow::Error) {
    let body = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({ "error": format!("{:#}", err) }),
    };
    println!("{}", body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_ids::RunId;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While processing data")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While processing data"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_missing_config_lists_keys() {
        let err = HelpfulError::missing_config(&["FABRIC_PIPELINE_ID", "OWNER_UPN"], "submit a run");
        let display = format!("{}", err);
        assert!(display.contains("FABRIC_PIPELINE_ID, OWNER_UPN"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_contention_names_holder() {
        let run_id = RunId::new();
        let err: HelpfulError = CoordinatorError::LockContention {
            holder: Some(RunLockInfo {
                run_id: run_id.clone(),
                locked_at: None,
                locked_by: Some("alice".into()),
            }),
        }
        .into();
        let display = format!("{}", err);
        assert!(display.contains(run_id.as_str()));
        assert!(display.contains("alice"));
        assert!(display.contains("portal unlock"));
    }
}
