//! # Outbox Repository
//!
//! Events for external collaborators, written in the same transaction as the
//! change that caused them.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleProcessor (partial payment)                                       │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                   SINGLE TRANSACTION                              │ │
//! │  │  1. debit every line                                              │ │
//! │  │  2. INSERT INTO invoices / invoice_items                          │ │
//! │  │  3. INSERT INTO outbox ('RECEIVABLE', invoice_id, <json>)         │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │       │ COMMIT                                                          │
//! │       ▼                                                                 │
//! │  Relay (outside this crate)                                            │
//! │  get_pending() → deliver to Customer Ledger → mark_published()         │
//! │                                 on failure  → mark_failed()            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// One queued event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: String,
    /// e.g. `RECEIVABLE`.
    pub event_type: String,
    /// Document the event is about (invoice id).
    pub aggregate_id: String,
    /// JSON body.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Decodes the JSON payload.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

const OUTBOX_COLUMNS: &str =
    "id, event_type, aggregate_id, payload, attempts, last_error, created_at, published_at";

/// Repository for outbox delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Undelivered entries, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE published_at IS NULL \
             ORDER BY created_at ASC, rowid ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries about one document.
    pub async fn for_aggregate(&self, aggregate_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE aggregate_id = ? ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as delivered.
    pub async fn mark_published(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE outbox SET published_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry", id));
        }

        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        debug!(id, error, "Outbox delivery failed");

        let result = sqlx::query(
            "UPDATE outbox SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry", id));
        }

        Ok(())
    }
}

/// Queues an event on the caller's transaction.
pub(crate) async fn enqueue<T: Serialize>(
    conn: &mut SqliteConnection,
    event_type: &str,
    aggregate_id: &str,
    payload: &T,
) -> DbResult<String> {
    let id = Uuid::new_v4().to_string();
    let payload = serde_json::to_string(payload)?;

    debug!(id = %id, event_type, aggregate_id, "Queuing outbox event");

    sqlx::query(
        "INSERT INTO outbox (id, event_type, aggregate_id, payload, attempts, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
    )
    .bind(&id)
    .bind(event_type)
    .bind(aggregate_id)
    .bind(&payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup;

    #[tokio::test]
    async fn test_relay_bookkeeping() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let first = enqueue(&mut conn, "RECEIVABLE", "inv-1", &serde_json::json!({ "n": 1 }))
            .await
            .unwrap();
        let second = enqueue(&mut conn, "RECEIVABLE", "inv-2", &serde_json::json!({ "n": 2 }))
            .await
            .unwrap();
        drop(conn);

        let outbox = db.outbox();
        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(
            pending.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec![first.as_str(), second.as_str()]
        );

        outbox.mark_failed(&first, "ledger offline").await.unwrap();
        outbox.mark_published(&second).await.unwrap();

        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("ledger offline"));

        let err = outbox.mark_published("missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
