//! Error types for the metadata store.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Store errors.
///
/// Every variant is fatal for the operation that produced it. Lock
/// contention is not an error: it is reported as `Ok(false)`.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, pool closed, ...)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (creating the database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored value that does not decode into the domain model
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid connection URL or configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// KPI blob (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// True when the failure is about reaching the store at all rather than
    /// about the data in it.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DbError::Sqlx(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
            ) | DbError::Io(_)
        )
    }
}
