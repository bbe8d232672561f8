//! # Shift Repository
//!
//! Persistence for POS cash sessions. State transitions are single
//! conditional statements (`... WHERE status = 'OPEN'`); the partial unique
//! index `idx_shifts_one_open` serializes concurrent starts.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use depot_core::{Shift, ShiftStatus};

const SHIFT_COLUMNS: &str = "id, warehouse_id, cashier_id, status, start_amount_cents, start_time, \
     end_amount_cents, end_time, total_sales_cents, transaction_count, \
     expected_amount_cents, variance_cents, notes";

/// Repository for shift rows.
#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

impl ShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Shift>> {
        fetch(&self.pool, id).await
    }

    /// The OPEN shift for a warehouse and cashier, if any.
    pub async fn find_open(&self, warehouse_id: &str, cashier_id: &str) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(&format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts \
             WHERE warehouse_id = ? AND cashier_id = ? AND status = 'OPEN'"
        ))
        .bind(warehouse_id)
        .bind(cashier_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(shift)
    }

    /// Shifts at a warehouse, newest first.
    pub async fn list_by_warehouse(&self, warehouse_id: &str, limit: u32) -> DbResult<Vec<Shift>> {
        let shifts = sqlx::query_as::<_, Shift>(&format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts WHERE warehouse_id = ? \
             ORDER BY start_time DESC LIMIT ?"
        ))
        .bind(warehouse_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(shifts)
    }

    /// Inserts a new OPEN shift.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - an OPEN shift exists for the pair
    pub async fn insert(&self, shift: &Shift) -> DbResult<()> {
        debug!(id = %shift.id, warehouse_id = %shift.warehouse_id, cashier_id = %shift.cashier_id, "Inserting shift");

        sqlx::query(
            "INSERT INTO shifts (
                id, warehouse_id, cashier_id, status, start_amount_cents, start_time,
                total_sales_cents, transaction_count, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7)",
        )
        .bind(&shift.id)
        .bind(&shift.warehouse_id)
        .bind(&shift.cashier_id)
        .bind(ShiftStatus::Open)
        .bind(shift.start_amount_cents)
        .bind(shift.start_time)
        .bind(&shift.notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Closes an OPEN shift, computing expected cash and variance in SQL.
    ///
    /// Returns false when no OPEN shift with that id exists.
    pub async fn close(
        &self,
        id: &str,
        end_amount_cents: i64,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(id, end_amount_cents, "Closing shift");

        let result = sqlx::query(
            "UPDATE shifts SET
                status = 'CLOSED',
                end_amount_cents = ?2,
                end_time = ?3,
                expected_amount_cents = start_amount_cents + total_sales_cents,
                variance_cents = ?2 - (start_amount_cents + total_sales_cents),
                notes = COALESCE(?4, notes)
            WHERE id = ?1 AND status = 'OPEN'",
        )
        .bind(id)
        .bind(end_amount_cents)
        .bind(now)
        .bind(notes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Adds a sale recorded outside the sale processor.
    pub async fn record_sale(&self, id: &str, amount_cents: i64) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        add_sale(&mut conn, id, amount_cents).await
    }
}

pub(crate) async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Shift>>
where
    E: SqliteExecutor<'e>,
{
    let shift = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(shift)
}

/// Adds one sale to an OPEN shift's running totals.
///
/// Returns false when the shift is missing or no longer OPEN.
pub(crate) async fn add_sale(
    conn: &mut SqliteConnection,
    id: &str,
    amount_cents: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE shifts SET
            total_sales_cents = total_sales_cents + ?2,
            transaction_count = transaction_count + 1
        WHERE id = ?1 AND status = 'OPEN'",
    )
    .bind(id)
    .bind(amount_cents)
    .execute(&mut *conn)
    .await?;

    debug!(id, amount_cents, recorded = result.rows_affected() == 1, "Recording shift sale");
    Ok(result.rows_affected() == 1)
}
