//! # Ledger Repository
//!
//! Append-only log of quantity mutations. Rows are inserted by the engine in
//! the same transaction as the stock update and are never updated or deleted
//! (the schema's triggers abort any attempt).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use depot_core::{LedgerEntry, LedgerEntryType, ReferenceType};

const LEDGER_COLUMNS: &str = "id, product_id, warehouse_id, entry_type, delta, balance_after, \
     actor_id, reference_type, reference_id, reason, notes, created_at";

/// Read access to ledger history, for reporting and audits.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Entries for one pair, newest first.
    pub async fn history(
        &self,
        product_id: &str,
        warehouse_id: &str,
        limit: u32,
    ) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries \
             WHERE product_id = ? AND warehouse_id = ? \
             ORDER BY seq DESC LIMIT ?"
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries of one type created at or after `since`, oldest first.
    pub async fn by_type(
        &self,
        entry_type: LedgerEntryType,
        since: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries \
             WHERE entry_type = ? AND created_at >= ? \
             ORDER BY created_at ASC, seq ASC LIMIT ?"
        ))
        .bind(entry_type)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries caused by one document (invoice, transfer, ...), in write order.
    pub async fn by_reference(
        &self,
        reference_id: &str,
    ) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE reference_id = ? ORDER BY seq ASC"
        ))
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries of one reference kind for a document.
    pub async fn by_reference_kind(
        &self,
        kind: ReferenceType,
        reference_id: &str,
    ) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries \
             WHERE reference_type = ? AND reference_id = ? ORDER BY seq ASC"
        ))
        .bind(kind)
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Total number of entries.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Appends one entry on the caller's transaction.
pub(crate) async fn append(conn: &mut SqliteConnection, entry: &LedgerEntry) -> DbResult<()> {
    debug!(
        id = %entry.id,
        product_id = %entry.product_id,
        warehouse_id = %entry.warehouse_id,
        entry_type = %entry.entry_type,
        delta = entry.delta,
        "Appending ledger entry"
    );

    sqlx::query(
        "INSERT INTO ledger_entries (
            id, product_id, warehouse_id, entry_type, delta, balance_after,
            actor_id, reference_type, reference_id, reason, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(&entry.id)
    .bind(&entry.product_id)
    .bind(&entry.warehouse_id)
    .bind(entry.entry_type)
    .bind(entry.delta)
    .bind(entry.balance_after)
    .bind(&entry.actor_id)
    .bind(entry.reference_type)
    .bind(&entry.reference_id)
    .bind(entry.reason)
    .bind(&entry.notes)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
