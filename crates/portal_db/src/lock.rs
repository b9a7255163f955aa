//! Single-row admission lock.
//!
//! The `run_lock` table holds exactly one row keyed by [`LOCK_KEY`]. A null
//! `run_id` means the slot is free. Every mutation is one conditional
//! `UPDATE`, so concurrent callers race inside the database: of two
//! `acquire` calls on a free slot exactly one sees `rows_affected == 1`.
//!
//! The lock is fail-closed. Store errors propagate as `Err`; callers must
//! never read an error as "free".

use portal_ids::RunId;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::error::{DbError, Result};
use crate::types::RunLockInfo;
use crate::PortalDb;

/// Key of the singleton lock row.
pub const LOCK_KEY: &str = "ACTIVE_PIPELINE_RUN";

/// Compare-and-swap lock over the singleton `run_lock` row.
#[derive(Clone)]
pub struct RunLock {
    pool: SqlitePool,
}

impl RunLock {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the current holder, if any. Never blocks on contention.
    pub async fn check(&self) -> Result<Option<RunLockInfo>> {
        let row = sqlx::query("SELECT run_id, locked_at, locked_by FROM run_lock WHERE lock_key = ?")
            .bind(LOCK_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            // Bootstrap inserts the row; its absence means the schema was tampered with.
            return Err(DbError::invalid_state("run_lock row is missing"));
        };

        let run_id: Option<String> = row.try_get("run_id")?;
        let Some(run_id) = run_id else {
            return Ok(None);
        };

        let run_id = RunId::parse(&run_id)
            .map_err(|e| DbError::invalid_state(format!("run_lock holder: {}", e)))?;
        let locked_at: Option<i64> = row.try_get("locked_at")?;

        Ok(Some(RunLockInfo {
            run_id,
            locked_at: locked_at.map(PortalDb::millis_to_datetime),
            locked_by: row.try_get("locked_by")?,
        }))
    }

    /// True when some run holds the slot.
    pub async fn is_held(&self) -> Result<bool> {
        Ok(self.check().await?.is_some())
    }

    /// Take the slot for `run_id` if and only if it is free.
    ///
    /// Returns `Ok(false)` when another run already holds it; contention is
    /// an expected outcome, not an error.
    pub async fn acquire(&self, run_id: &RunId, locked_by: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE run_lock
            SET run_id = ?,
                locked_at = ?,
                locked_by = ?
            WHERE lock_key = ?
              AND run_id IS NULL
            "#,
        )
        .bind(run_id.as_str())
        .bind(PortalDb::now_millis())
        .bind(locked_by)
        .bind(LOCK_KEY)
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() == 1;
        if acquired {
            info!(run_id = %run_id, locked_by, "Run lock acquired");
        } else {
            debug!(run_id = %run_id, "Run lock already held");
        }
        Ok(acquired)
    }

    /// Free the slot, but only if `run_id` holds it.
    ///
    /// Returns `Ok(false)` without touching anything when the slot is free or
    /// held by a different run, which makes this safe to call from cleanup
    /// paths without checking first.
    pub async fn release(&self, run_id: &RunId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE run_lock
            SET run_id = NULL,
                locked_at = NULL,
                locked_by = NULL
            WHERE lock_key = ?
              AND run_id = ?
            "#,
        )
        .bind(LOCK_KEY)
        .bind(run_id.as_str())
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected() == 1;
        if released {
            info!(run_id = %run_id, "Run lock released");
        } else {
            debug!(run_id = %run_id, "Run lock not held by this run; nothing released");
        }
        Ok(released)
    }

    /// Clear the slot regardless of who holds it.
    ///
    /// Administrative recovery for a lock left behind by a job that never
    /// reached a terminal status. Returns the holder that was evicted, if any.
    ///
    /// The clear is conditional on the holder just read, so a run admitted
    /// between the read and the write is never evicted unreported; the read
    /// is repeated instead.
    pub async fn force_release(&self) -> Result<Option<RunLockInfo>> {
        for _ in 0..FORCE_RELEASE_ATTEMPTS {
            let previous = self.check().await?;
            let observed = previous.as_ref().map(|info| info.run_id.as_str());

            let result = sqlx::query(
                r#"
                UPDATE run_lock
                SET run_id = NULL,
                    locked_at = NULL,
                    locked_by = NULL
                WHERE lock_key = ?
                  AND run_id IS ?
                "#,
            )
            .bind(LOCK_KEY)
            .bind(observed)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                debug!("Run lock changed hands during force release; re-reading");
                continue;
            }

            match &previous {
                Some(info) => warn!(run_id = %info.run_id, "Run lock force-released"),
                None => info!("Run lock force-release requested on a free lock"),
            }
            return Ok(previous);
        }

        Err(DbError::invalid_state(
            "run lock kept changing hands during force release",
        ))
    }
}

/// Re-reads allowed when the holder changes under a force release.
const FORCE_RELEASE_ATTEMPTS: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    async fn lock() -> RunLock {
        PortalDb::open_memory().await.unwrap().run_lock()
    }

    #[tokio::test]
    async fn test_fresh_lock_is_free() {
        let lock = lock().await;
        assert_eq!(lock.check().await.unwrap(), None);
        assert!(!lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_then_contention() {
        let lock = lock().await;
        let first = RunId::new();
        let second = RunId::new();

        assert!(lock.acquire(&first, "alice").await.unwrap());
        assert!(!lock.acquire(&second, "bob").await.unwrap());

        let holder = lock.check().await.unwrap().unwrap();
        assert_eq!(holder.run_id, first);
        assert_eq!(holder.locked_by.as_deref(), Some("alice"));
        assert!(holder.locked_at.is_some());
    }

    #[tokio::test]
    async fn test_release_requires_ownership() {
        let lock = lock().await;
        let owner = RunId::new();
        let stranger = RunId::new();

        assert!(!lock.release(&owner).await.unwrap(), "free lock releases nothing");

        lock.acquire(&owner, "alice").await.unwrap();
        assert!(!lock.release(&stranger).await.unwrap());
        assert_eq!(lock.check().await.unwrap().unwrap().run_id, owner);

        assert!(lock.release(&owner).await.unwrap());
        assert!(!lock.release(&owner).await.unwrap(), "second release is a no-op");
        assert!(!lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_force_release_reports_evicted_holder() {
        let lock = lock().await;
        let owner = RunId::new();
        lock.acquire(&owner, "alice").await.unwrap();

        let evicted = lock.force_release().await.unwrap().unwrap();
        assert_eq!(evicted.run_id, owner);
        assert!(!lock.is_held().await.unwrap());

        assert!(lock.force_release().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_force_release_of_free_lock_leaves_it_free() {
        let lock = lock().await;
        assert!(lock.force_release().await.unwrap().is_none());
        assert!(!lock.is_held().await.unwrap());

        let next = RunId::new();
        assert!(lock.acquire(&next, "bob").await.unwrap());
        assert_eq!(lock.check().await.unwrap().unwrap().run_id, next);
    }

    #[tokio::test]
    async fn test_closed_store_fails_closed() {
        let db = PortalDb::open_memory().await.unwrap();
        let lock = db.run_lock();
        db.close().await;

        assert!(lock.check().await.is_err());
        assert!(lock.acquire(&RunId::new(), "alice").await.is_err());
    }
}
