//! Append-only run audit trail.

use portal_ids::{EventId, RunId};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{EventType, RunEvent};
use crate::PortalDb;

impl PortalDb {
    /// Append an event to a run's trail.
    pub async fn append_event(
        &self,
        run_id: &RunId,
        event_type: EventType,
        message: &str,
    ) -> Result<EventId> {
        let id = EventId::new();
        sqlx::query(
            "INSERT INTO run_events (id, run_id, event_time, event_type, message) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(run_id.as_str())
        .bind(Self::now_millis())
        .bind(event_type.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// All events of a run, oldest first. Events written in the same
    /// millisecond keep insertion order.
    pub async fn get_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, event_time, event_type, message
            FROM run_events
            WHERE run_id = ?
            ORDER BY event_time ASC, rowid ASC
            "#,
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RunEvent> {
                let id: String = row.try_get("id")?;
                let event_type: String = row.try_get("event_type")?;
                Ok(RunEvent {
                    id: EventId::parse(&id).map_err(|e| DbError::invalid_state(e.to_string()))?,
                    run_id: run_id.clone(),
                    event_time: Self::millis_to_datetime(row.try_get("event_time")?),
                    event_type: EventType::parse(&event_type).ok_or_else(|| {
                        DbError::invalid_state(format!("Unknown event type: {}", event_type))
                    })?,
                    message: row.try_get("message")?,
                })
            })
            .collect()
    }
}
