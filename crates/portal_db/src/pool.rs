//! Connection pool creation.
//!
//! The store is SQLite through `sqlx`. Every pooled connection gets the same
//! pragmas through `SqliteConnectOptions`, so per-connection settings such as
//! `foreign_keys` and `busy_timeout` hold no matter which connection a query
//! lands on.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, Result};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL (`sqlite:<path>` or `sqlite::memory:`)
    pub url: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl DbConfig {
    /// SQLite file configuration. The file is created if missing.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref().display()),
            max_connections: 5,
        }
    }

    /// In-memory SQLite configuration (for testing).
    ///
    /// Each SQLite memory connection is its own database, so the pool is
    /// pinned to a single connection that never expires.
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    /// Configuration from a URL.
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !url.starts_with("sqlite:") {
            return Err(DbError::Config(format!(
                "Unsupported database URL '{}': expected sqlite:<path>",
                url
            )));
        }
        if is_memory_url(&url) {
            return Ok(Self {
                url,
                ..Self::sqlite_memory()
            });
        }
        Ok(Self {
            url,
            max_connections: 5,
        })
    }

    /// Set maximum connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn is_memory(&self) -> bool {
        is_memory_url(&self.url)
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Create a database pool from configuration.
pub async fn create_pool(config: &DbConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.is_memory() {
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await?;
    info!(url = %config.url, max_connections = config.max_connections, "Connected to metadata store");
    Ok(pool)
}
