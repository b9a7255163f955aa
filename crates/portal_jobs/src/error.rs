//! Error types for the external job service and artifact store.

use thiserror::Error;

/// Response bodies quoted in errors are cut to this many bytes.
pub const ERROR_BODY_LIMIT: usize = 500;

/// The bearer token for a request could not be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("No {0} token configured")]
    Missing(&'static str),
}

/// Job submission failed. No job was started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The service answered with anything but 202 Accepted.
    #[error("Pipeline trigger failed ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Pipeline trigger request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// A status poll failed. Says nothing about the job itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("No job handle to poll")]
    MissingHandle,

    #[error("Job status request returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Job status request failed: {0}")]
    Transport(String),

    #[error("Job status body is not valid JSON: {0}")]
    Malformed(String),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Reading an artifact failed. A missing artifact is not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("Artifact {path} returned {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Artifact request for {path} failed: {message}")]
    Transport { path: String, message: String },

    #[error("Artifact {path} is not valid JSON: {message}")]
    Malformed { path: String, message: String },

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Cut `body` to at most `limit` bytes on a char boundary.
pub(crate) fn truncate_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short", 500), "short");
        assert_eq!(truncate_body(&"x".repeat(600), 500).len(), 500);
        // 'é' is two bytes; cutting at 3 would split it.
        assert_eq!(truncate_body("aéé", 4), "aé");
    }

    #[test]
    fn test_submission_error_message() {
        let err = SubmissionError::Rejected {
            status: 400,
            body: "bad pipeline".into(),
        };
        assert_eq!(err.to_string(), "Pipeline trigger failed (400): bad pipeline");
    }
}
