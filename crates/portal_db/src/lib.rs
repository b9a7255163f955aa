//! Metadata store for the Fabric portal.
//!
//! This crate is the single source of truth for run state: run records,
//! their audit events, registered artifacts, restore records, and the
//! singleton run lock that admits at most one active pipeline run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use portal_db::{PortalDb, DbConfig};
//!
//! let db = PortalDb::connect(&DbConfig::sqlite("/var/lib/portal/portal.sqlite")).await?;
//!
//! let lock = db.run_lock();
//! if lock.acquire(&run_id, "alice").await? {
//!     // this caller owns the admission slot
//! }
//!
//! let active = db.get_active_run().await?;
//! ```

mod error;
mod pool;
mod schema;
mod types;

// Method implementations organized by table
mod artifacts;
mod events;
pub mod lock;
mod restores;
mod runs;

pub use error::{DbError, Result};
pub use lock::{RunLock, LOCK_KEY};
pub use pool::{create_pool, DbConfig};
pub use types::*;

use sqlx::sqlite::SqlitePool;
use std::path::Path;
use tracing::info;

/// Handle to the metadata store. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct PortalDb {
    pool: SqlitePool,
}

impl PortalDb {
    /// Connect with the given configuration and bootstrap the schema
    /// (tables, indexes, and the singleton lock row).
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        if !config.is_memory() {
            if let Some(parent) = sqlite_parent_dir(&config.url) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = create_pool(config).await?;
        let db = Self { pool };
        db.ensure_schema().await?;

        info!(url = %config.url, "Metadata store opened");
        Ok(db)
    }

    /// Open or create a database file at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&DbConfig::sqlite(path)).await
    }

    /// Open a private in-memory database (for tests).
    pub async fn open_memory() -> Result<Self> {
        Self::connect(&DbConfig::sqlite_memory()).await
    }

    /// The admission lock layered on this store.
    pub fn run_lock(&self) -> RunLock {
        RunLock::new(self.pool.clone())
    }

    /// Get the underlying connection pool (escape hatch for tests and
    /// ad-hoc maintenance queries).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection. Every later call fails with a
    /// pool-closed error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Directory part of a `sqlite:<path>[?query]` URL.
fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or(rest);
    Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
}

// Timestamp utilities
impl PortalDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}
