//! # StockRecord Store
//!
//! Materialized `(product, warehouse) → quantity` rows.
//!
//! ## Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every quantity write is a single conditional statement:               │
//! │                                                                         │
//! │  try_debit      UPDATE ... WHERE quantity >= ?         (no read first)  │
//! │  upsert_credit  INSERT ... ON CONFLICT DO UPDATE       (creates row)    │
//! │  apply_guarded  UPDATE ... WHERE quantity = <observed> (count/override) │
//! │  insert_initial INSERT ... (fails if the row appeared meanwhile)       │
//! │                                                                         │
//! │  All of them also require the product and warehouse to be active and   │
//! │  return the new balance (RETURNING quantity), or None when the guard   │
//! │  did not match. Only the engine calls these, inside its transaction.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use depot_core::StockRecord;

const STOCK_COLUMNS: &str = "product_id, warehouse_id, quantity, reserved_quantity, \
     min_stock, max_stock, version, last_updated";

/// Guard shared by every quantity write: both sides of the pair are active.
const ACTIVE_GUARD: &str = "EXISTS (SELECT 1 FROM products WHERE id = ?1 AND is_active = 1) \
     AND EXISTS (SELECT 1 FROM warehouses WHERE id = ?2 AND is_active = 1)";

/// Read access to stock records.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Gets the record for a pair, if any movement ever happened.
    pub async fn get(&self, product_id: &str, warehouse_id: &str) -> DbResult<Option<StockRecord>> {
        fetch(&self.pool, product_id, warehouse_id).await
    }

    /// All records at a warehouse, ordered by product.
    pub async fn list_by_warehouse(&self, warehouse_id: &str) -> DbResult<Vec<StockRecord>> {
        let records = sqlx::query_as::<_, StockRecord>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records WHERE warehouse_id = ? ORDER BY product_id"
        ))
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// All records for a product across warehouses.
    pub async fn list_by_product(&self, product_id: &str) -> DbResult<Vec<StockRecord>> {
        let records = sqlx::query_as::<_, StockRecord>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records WHERE product_id = ? ORDER BY warehouse_id"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Records whose quantity is below their configured minimum.
    pub async fn below_minimum(&self, warehouse_id: &str) -> DbResult<Vec<StockRecord>> {
        let records = sqlx::query_as::<_, StockRecord>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records \
             WHERE warehouse_id = ? AND min_stock IS NOT NULL AND quantity < min_stock \
             ORDER BY quantity ASC, product_id"
        ))
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Updates min/max thresholds. Not a quantity mutation.
    pub async fn set_thresholds(
        &self,
        product_id: &str,
        warehouse_id: &str,
        min_stock: Option<i64>,
        max_stock: Option<i64>,
    ) -> DbResult<StockRecord> {
        debug!(product_id, warehouse_id, ?min_stock, ?max_stock, "Setting stock thresholds");

        let record = sqlx::query_as::<_, StockRecord>(&format!(
            "UPDATE stock_records SET min_stock = ?3, max_stock = ?4 \
             WHERE product_id = ?1 AND warehouse_id = ?2 \
             RETURNING {STOCK_COLUMNS}"
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .bind(min_stock)
        .bind(max_stock)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| {
            DbError::not_found("StockRecord", format!("{product_id}@{warehouse_id}"))
        })
    }
}

// =============================================================================
// Connection-level operations (used inside engine transactions)
// =============================================================================

pub(crate) async fn fetch<'e, E>(
    executor: E,
    product_id: &str,
    warehouse_id: &str,
) -> DbResult<Option<StockRecord>>
where
    E: SqliteExecutor<'e>,
{
    let record = sqlx::query_as::<_, StockRecord>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stock_records WHERE product_id = ? AND warehouse_id = ?"
    ))
    .bind(product_id)
    .bind(warehouse_id)
    .fetch_optional(executor)
    .await?;

    Ok(record)
}

/// Decrements by `quantity` only if enough stock is on hand.
pub(crate) async fn try_debit(
    conn: &mut SqliteConnection,
    product_id: &str,
    warehouse_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<Option<i64>> {
    let balance: Option<i64> = sqlx::query_scalar(&format!(
        "UPDATE stock_records \
         SET quantity = quantity - ?3, version = version + 1, last_updated = ?4 \
         WHERE product_id = ?1 AND warehouse_id = ?2 AND quantity >= ?3 AND {ACTIVE_GUARD} \
         RETURNING quantity"
    ))
    .bind(product_id)
    .bind(warehouse_id)
    .bind(quantity)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    debug!(product_id, warehouse_id, quantity, matched = balance.is_some(), "Conditional debit");
    Ok(balance)
}

/// Increments by `quantity`, creating the record on first movement.
pub(crate) async fn upsert_credit(
    conn: &mut SqliteConnection,
    product_id: &str,
    warehouse_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<Option<i64>> {
    let balance: Option<i64> = sqlx::query_scalar(&format!(
        "INSERT INTO stock_records (product_id, warehouse_id, quantity, version, last_updated) \
         SELECT ?1, ?2, ?3, 1, ?4 WHERE {ACTIVE_GUARD} \
         ON CONFLICT (product_id, warehouse_id) DO UPDATE SET \
             quantity = quantity + excluded.quantity, \
             version = version + 1, \
             last_updated = excluded.last_updated \
         RETURNING quantity"
    ))
    .bind(product_id)
    .bind(warehouse_id)
    .bind(quantity)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    debug!(product_id, warehouse_id, quantity, matched = balance.is_some(), "Credit upsert");
    Ok(balance)
}

/// Applies `delta` only if the quantity still equals `observed`.
pub(crate) async fn apply_guarded(
    conn: &mut SqliteConnection,
    product_id: &str,
    warehouse_id: &str,
    delta: i64,
    observed: i64,
    now: DateTime<Utc>,
) -> DbResult<Option<i64>> {
    let balance: Option<i64> = sqlx::query_scalar(&format!(
        "UPDATE stock_records \
         SET quantity = quantity + ?3, version = version + 1, last_updated = ?5 \
         WHERE product_id = ?1 AND warehouse_id = ?2 AND quantity = ?4 AND {ACTIVE_GUARD} \
         RETURNING quantity"
    ))
    .bind(product_id)
    .bind(warehouse_id)
    .bind(delta)
    .bind(observed)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    debug!(product_id, warehouse_id, delta, observed, matched = balance.is_some(), "Guarded update");
    Ok(balance)
}

/// Creates a record at `quantity`. A concurrent creation surfaces as
/// [`DbError::UniqueViolation`].
pub(crate) async fn insert_initial(
    conn: &mut SqliteConnection,
    product_id: &str,
    warehouse_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<Option<i64>> {
    let balance: Option<i64> = sqlx::query_scalar(&format!(
        "INSERT INTO stock_records (product_id, warehouse_id, quantity, version, last_updated) \
         SELECT ?1, ?2, ?3, 1, ?4 WHERE {ACTIVE_GUARD} \
         RETURNING quantity"
    ))
    .bind(product_id)
    .bind(warehouse_id)
    .bind(quantity)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(balance)
}

/// `(stored quantity, Σ ledger delta)` for one pair.
pub(crate) async fn stored_and_ledger_sum<'e, E>(
    executor: E,
    product_id: &str,
    warehouse_id: &str,
) -> DbResult<Option<(i64, i64)>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT s.quantity, \
                (SELECT COALESCE(SUM(l.delta), 0) FROM ledger_entries l \
                  WHERE l.product_id = s.product_id AND l.warehouse_id = s.warehouse_id) \
         FROM stock_records s WHERE s.product_id = ? AND s.warehouse_id = ?",
    )
    .bind(product_id)
    .bind(warehouse_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// `(product, warehouse, stored, Σ delta)` for every record.
pub(crate) async fn all_stored_and_ledger_sums<'e, E>(
    executor: E,
) -> DbResult<Vec<(String, String, i64, i64)>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
        "SELECT s.product_id, s.warehouse_id, s.quantity, COALESCE(SUM(l.delta), 0) \
         FROM stock_records s \
         LEFT JOIN ledger_entries l \
           ON l.product_id = s.product_id AND l.warehouse_id = s.warehouse_id \
         GROUP BY s.product_id, s.warehouse_id, s.quantity \
         ORDER BY s.product_id, s.warehouse_id",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
