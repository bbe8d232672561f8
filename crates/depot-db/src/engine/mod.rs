//! # Stock Ledger Engine
//!
//! The only writer of `stock_records` and `ledger_entries`.
//!
//! ## One Mutation = One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  debit(X, A, 3)                                                         │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── UPDATE stock_records SET quantity = quantity - 3                 │
//! │   │   WHERE product_id = X AND warehouse_id = A AND quantity >= 3      │
//! │   │   RETURNING quantity                 ← conditional, no read first  │
//! │   │                                                                     │
//! │   ├── matched?  INSERT INTO ledger_entries (EXPORT, -3, balance)       │
//! │   └── no match? diagnose: NotFound | InsufficientStock{available}      │
//! │  COMMIT                                  ← or ROLLBACK on any error    │
//! │                                                                         │
//! │  SQLITE_BUSY anywhere → Conflict → retried with backoff (bounded)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `*_in` functions run on a caller-supplied connection so the sale
//! processor can put every line of an invoice in one transaction.

pub(crate) mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::DbError;
use crate::repository::incident::{IncidentKind, IncidentRepository};
use crate::repository::{catalog, ledger, stock, LedgerRepository, StockRepository};
use depot_core::validation::{
    validate_adjustment, validate_id, validate_movement, validate_stock_level,
    validate_thresholds,
};
use depot_core::{
    AdjustmentRequest, CreditKind, DebitKind, LedgerEntry, LedgerEntryType, ReasonCode,
    ReconciliationReport, StockError, StockMovement, StockRecord, StockResult, ValidationError,
};

use self::retry::with_retry;

// =============================================================================
// StockLedger trait
// =============================================================================

/// The debit/credit surface multi-step protocols are written against.
///
/// [`StockLedgerEngine`] is the SQLite implementation; transfers only need
/// this trait, so source and destination may live behind different stores.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn debit(&self, movement: &StockMovement, kind: DebitKind) -> StockResult<LedgerEntry>;

    async fn credit(&self, movement: &StockMovement, kind: CreditKind)
        -> StockResult<LedgerEntry>;

    async fn quantity(&self, product_id: &str, warehouse_id: &str) -> StockResult<i64>;
}

// =============================================================================
// Engine
// =============================================================================

/// Atomic stock primitives over a SQLite pool.
///
/// ## Usage
/// ```rust,ignore
/// let engine = db.engine();
/// let entry = engine
///     .debit(&StockMovement::new("X", "A", 5, "clerk-1"), DebitKind::Export)
///     .await?;
/// assert_eq!(entry.delta, -5);
/// ```
#[derive(Debug, Clone)]
pub struct StockLedgerEngine {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl StockLedgerEngine {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        StockLedgerEngine { pool, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Decrements stock if at least `movement.quantity` is on hand.
    ///
    /// ## Returns
    /// * `Ok(LedgerEntry)` - EXPORT or TRANSFER_OUT entry with `delta = -quantity`
    /// * `Err(InsufficientStock)` - with the quantity available at the time
    /// * `Err(NotFound)` - no record for the pair, or product/warehouse unknown or inactive
    pub async fn debit(&self, movement: &StockMovement, kind: DebitKind) -> StockResult<LedgerEntry> {
        validate_movement(movement)?;

        let entry = with_retry(&self.retry, "debit", move || self.debit_once(movement, kind)).await?;

        info!(
            product_id = %entry.product_id,
            warehouse_id = %entry.warehouse_id,
            entry_type = %entry.entry_type,
            delta = entry.delta,
            balance = entry.balance_after,
            "Stock debited"
        );
        Ok(entry)
    }

    /// Increments stock, creating the record on first movement.
    pub async fn credit(
        &self,
        movement: &StockMovement,
        kind: CreditKind,
    ) -> StockResult<LedgerEntry> {
        validate_movement(movement)?;

        let entry =
            with_retry(&self.retry, "credit", move || self.credit_once(movement, kind)).await?;

        info!(
            product_id = %entry.product_id,
            warehouse_id = %entry.warehouse_id,
            entry_type = %entry.entry_type,
            delta = entry.delta,
            balance = entry.balance_after,
            "Stock credited"
        );
        Ok(entry)
    }

    /// Applies a signed manual correction.
    ///
    /// Crate-private: manual corrections go through
    /// [`crate::processor::AdjustmentProcessor`] so a reason is always recorded.
    pub(crate) async fn adjust(&self, request: &AdjustmentRequest) -> StockResult<LedgerEntry> {
        validate_adjustment(request)?;

        let entry =
            with_retry(&self.retry, "adjust", move || self.adjust_once(request)).await?;

        info!(
            product_id = %entry.product_id,
            warehouse_id = %entry.warehouse_id,
            delta = entry.delta,
            balance = entry.balance_after,
            reason = ?entry.reason,
            "Stock adjusted"
        );
        Ok(entry)
    }

    /// Sets stock to an absolute counted quantity (STOCK_COUNT adjustment).
    pub(crate) async fn count(&self, count: &StockCount<'_>) -> StockResult<LedgerEntry> {
        validate_id(count.product_id, "product_id")?;
        validate_id(count.warehouse_id, "warehouse_id")?;
        validate_id(count.actor_id, "actor_id")?;
        validate_stock_level(count.counted, "counted_quantity")?;

        let entry = with_retry(&self.retry, "count", move || self.count_once(count)).await?;

        info!(
            product_id = %entry.product_id,
            warehouse_id = %entry.warehouse_id,
            delta = entry.delta,
            balance = entry.balance_after,
            "Stock count applied"
        );
        Ok(entry)
    }

    /// Current quantity for a pair.
    pub async fn get_quantity(&self, product_id: &str, warehouse_id: &str) -> StockResult<i64> {
        Ok(self.get_record(product_id, warehouse_id).await?.quantity)
    }

    /// The full stock record for a pair.
    pub async fn get_record(&self, product_id: &str, warehouse_id: &str) -> StockResult<StockRecord> {
        stock::fetch(&self.pool, product_id, warehouse_id)
            .await?
            .ok_or_else(|| StockError::not_found("StockRecord", pair_id(product_id, warehouse_id)))
    }

    /// Compares the stored quantity with the sum of ledger deltas.
    ///
    /// Drift is reported and logged, never corrected.
    pub async fn reconcile(
        &self,
        product_id: &str,
        warehouse_id: &str,
    ) -> StockResult<ReconciliationReport> {
        let (stored, ledger_sum) =
            stock::stored_and_ledger_sum(&self.pool, product_id, warehouse_id)
                .await?
                .ok_or_else(|| {
                    StockError::not_found("StockRecord", pair_id(product_id, warehouse_id))
                })?;

        let report = ReconciliationReport::new(product_id, warehouse_id, stored, ledger_sum);
        if !report.is_consistent() {
            error!(
                product_id,
                warehouse_id,
                stored,
                ledger_sum,
                drift = report.drift,
                "Ledger drift detected"
            );
        }

        Ok(report)
    }

    /// Reconciles every stock record. A drifted pair is recorded as an
    /// incident unless an unresolved drift incident already exists for it.
    pub async fn reconcile_all(&self) -> StockResult<Vec<ReconciliationReport>> {
        let rows = stock::all_stored_and_ledger_sums(&self.pool).await?;
        let incidents = IncidentRepository::new(self.pool.clone());

        let mut reports = Vec::with_capacity(rows.len());
        for (product_id, warehouse_id, stored, ledger_sum) in rows {
            let report = ReconciliationReport::new(product_id, warehouse_id, stored, ledger_sum);

            let already_open = !report.is_consistent()
                && incidents
                    .find_open(IncidentKind::LedgerDrift, &report.product_id, &report.warehouse_id)
                    .await?
                    .is_some();

            if !report.is_consistent() && !already_open {
                incidents
                    .record(
                        IncidentKind::LedgerDrift,
                        &report.product_id,
                        &report.warehouse_id,
                        None,
                        &serde_json::json!({
                            "stored_quantity": report.stored_quantity,
                            "ledger_sum": report.ledger_sum,
                            "drift": report.drift,
                        }),
                    )
                    .await?;
            }

            reports.push(report);
        }

        let drifted = reports.iter().filter(|r| !r.is_consistent()).count();
        info!(records = reports.len(), drifted, "Reconciliation complete");

        Ok(reports)
    }

    /// Ledger entries for a pair, newest first.
    pub async fn history(
        &self,
        product_id: &str,
        warehouse_id: &str,
        limit: u32,
    ) -> StockResult<Vec<LedgerEntry>> {
        Ok(LedgerRepository::new(self.pool.clone())
            .history(product_id, warehouse_id, limit)
            .await?)
    }

    /// Ledger entries of one type since a point in time, oldest first.
    pub async fn entries_by_type(
        &self,
        entry_type: LedgerEntryType,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StockResult<Vec<LedgerEntry>> {
        Ok(LedgerRepository::new(self.pool.clone())
            .by_type(entry_type, since, limit)
            .await?)
    }

    /// Sets min/max thresholds on an existing record. Writes no ledger entry.
    pub async fn set_thresholds(
        &self,
        product_id: &str,
        warehouse_id: &str,
        min_stock: Option<i64>,
        max_stock: Option<i64>,
    ) -> StockResult<StockRecord> {
        validate_id(product_id, "product_id")?;
        validate_id(warehouse_id, "warehouse_id")?;
        validate_thresholds(min_stock, max_stock)?;

        Ok(StockRepository::new(self.pool.clone())
            .set_thresholds(product_id, warehouse_id, min_stock, max_stock)
            .await?)
    }

    /// Records below their configured minimum at a warehouse.
    pub async fn low_stock(&self, warehouse_id: &str) -> StockResult<Vec<StockRecord>> {
        Ok(StockRepository::new(self.pool.clone())
            .below_minimum(warehouse_id)
            .await?)
    }

    // =========================================================================
    // Single attempts
    // =========================================================================

    async fn debit_once(&self, movement: &StockMovement, kind: DebitKind) -> StockResult<LedgerEntry> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let entry = debit_in(&mut tx, movement, kind).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(entry)
    }

    async fn credit_once(
        &self,
        movement: &StockMovement,
        kind: CreditKind,
    ) -> StockResult<LedgerEntry> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let entry = credit_in(&mut tx, movement, kind).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(entry)
    }

    async fn adjust_once(&self, request: &AdjustmentRequest) -> StockResult<LedgerEntry> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let entry = adjust_in(&mut tx, request).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(entry)
    }

    async fn count_once(&self, count: &StockCount<'_>) -> StockResult<LedgerEntry> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let entry = count_in(&mut tx, count).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(entry)
    }
}

#[async_trait]
impl StockLedger for StockLedgerEngine {
    async fn debit(&self, movement: &StockMovement, kind: DebitKind) -> StockResult<LedgerEntry> {
        StockLedgerEngine::debit(self, movement, kind).await
    }

    async fn credit(
        &self,
        movement: &StockMovement,
        kind: CreditKind,
    ) -> StockResult<LedgerEntry> {
        StockLedgerEngine::credit(self, movement, kind).await
    }

    async fn quantity(&self, product_id: &str, warehouse_id: &str) -> StockResult<i64> {
        self.get_quantity(product_id, warehouse_id).await
    }
}

/// Absolute stock count for one pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StockCount<'a> {
    pub product_id: &'a str,
    pub warehouse_id: &'a str,
    pub counted: i64,
    pub actor_id: &'a str,
    pub notes: Option<&'a str>,
}

// =============================================================================
// Connection-level primitives
// =============================================================================

/// Conditional debit on the caller's transaction.
pub(crate) async fn debit_in(
    conn: &mut SqliteConnection,
    movement: &StockMovement,
    kind: DebitKind,
) -> StockResult<LedgerEntry> {
    let now = Utc::now();
    let (product_id, warehouse_id) = (movement.product_id.as_str(), movement.warehouse_id.as_str());

    let Some(balance) =
        stock::try_debit(conn, product_id, warehouse_id, movement.quantity, now).await?
    else {
        return Err(explain_failed_debit(conn, product_id, warehouse_id, movement.quantity).await);
    };

    let entry = movement_entry(movement, kind.into(), -movement.quantity, balance, now);
    ledger::append(conn, &entry).await?;
    Ok(entry)
}

/// Credit on the caller's transaction; creates the record if needed.
pub(crate) async fn credit_in(
    conn: &mut SqliteConnection,
    movement: &StockMovement,
    kind: CreditKind,
) -> StockResult<LedgerEntry> {
    let now = Utc::now();
    let (product_id, warehouse_id) = (movement.product_id.as_str(), movement.warehouse_id.as_str());

    let Some(balance) =
        stock::upsert_credit(conn, product_id, warehouse_id, movement.quantity, now).await?
    else {
        ensure_active(conn, product_id, warehouse_id).await?;
        return Err(StockError::Conflict { attempts: 1 });
    };

    let entry = movement_entry(movement, kind.into(), movement.quantity, balance, now);
    ledger::append(conn, &entry).await?;
    Ok(entry)
}

async fn adjust_in(
    conn: &mut SqliteConnection,
    request: &AdjustmentRequest,
) -> StockResult<LedgerEntry> {
    let now = Utc::now();
    let (product_id, warehouse_id) = (request.product_id.as_str(), request.warehouse_id.as_str());

    if request.delta > 0 {
        let Some(balance) =
            stock::upsert_credit(conn, product_id, warehouse_id, request.delta, now).await?
        else {
            ensure_active(conn, product_id, warehouse_id).await?;
            return Err(StockError::Conflict { attempts: 1 });
        };
        return append_adjustment(conn, request, request.delta, balance, now).await;
    }

    let requested = -request.delta;
    if let Some(balance) = stock::try_debit(conn, product_id, warehouse_id, requested, now).await? {
        return append_adjustment(conn, request, request.delta, balance, now).await;
    }

    let record = existing_record(conn, product_id, warehouse_id)
        .await?
        .ok_or_else(|| StockError::not_found("StockRecord", pair_id(product_id, warehouse_id)))?;

    if record.quantity >= requested {
        return Err(StockError::Conflict { attempts: 1 });
    }
    if !request.allow_below_zero {
        return Err(StockError::InsufficientStock {
            product_id: product_id.to_string(),
            warehouse_id: warehouse_id.to_string(),
            available: record.quantity,
            requested,
        });
    }

    // Override: clamp at zero and record what was actually applied.
    let applied = -record.quantity;
    if applied == 0 {
        return Err(ValidationError::not_allowed("delta", "stock is already zero").into());
    }

    debug!(product_id, warehouse_id, requested = request.delta, applied, "Clamping adjustment at zero");

    let balance = stock::apply_guarded(conn, product_id, warehouse_id, applied, record.quantity, now)
        .await?
        .ok_or(StockError::Conflict { attempts: 1 })?;

    append_adjustment(conn, request, applied, balance, now).await
}

async fn count_in(conn: &mut SqliteConnection, count: &StockCount<'_>) -> StockResult<LedgerEntry> {
    let now = Utc::now();
    let (product_id, warehouse_id) = (count.product_id, count.warehouse_id);

    let (delta, balance) = match existing_record(conn, product_id, warehouse_id).await? {
        None => {
            if count.counted == 0 {
                return Err(
                    ValidationError::not_allowed("counted_quantity", "matches current quantity")
                        .into(),
                );
            }
            let balance = match stock::insert_initial(conn, product_id, warehouse_id, count.counted, now).await {
                Ok(Some(balance)) => balance,
                Ok(None) => return Err(StockError::Conflict { attempts: 1 }),
                Err(err) if err.is_unique_violation() => {
                    return Err(StockError::Conflict { attempts: 1 })
                }
                Err(err) => return Err(err.into()),
            };
            (count.counted, balance)
        }
        Some(record) => {
            let delta = count.counted - record.quantity;
            if delta == 0 {
                return Err(
                    ValidationError::not_allowed("counted_quantity", "matches current quantity")
                        .into(),
                );
            }
            let balance =
                stock::apply_guarded(conn, product_id, warehouse_id, delta, record.quantity, now)
                    .await?
                    .ok_or(StockError::Conflict { attempts: 1 })?;
            (delta, balance)
        }
    };

    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        warehouse_id: warehouse_id.to_string(),
        entry_type: LedgerEntryType::Adjustment,
        delta,
        balance_after: balance,
        actor_id: count.actor_id.to_string(),
        reference_type: None,
        reference_id: None,
        reason: Some(ReasonCode::StockCount),
        notes: count.notes.map(str::to_string),
        created_at: now,
    };
    ledger::append(conn, &entry).await?;
    Ok(entry)
}

// =============================================================================
// Helpers
// =============================================================================

fn pair_id(product_id: &str, warehouse_id: &str) -> String {
    format!("{product_id}@{warehouse_id}")
}

fn movement_entry(
    movement: &StockMovement,
    entry_type: LedgerEntryType,
    delta: i64,
    balance_after: i64,
    now: DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        id: Uuid::new_v4().to_string(),
        product_id: movement.product_id.clone(),
        warehouse_id: movement.warehouse_id.clone(),
        entry_type,
        delta,
        balance_after,
        actor_id: movement.actor_id.clone(),
        reference_type: movement.reference.as_ref().map(|r| r.kind),
        reference_id: movement.reference.as_ref().map(|r| r.id.clone()),
        reason: None,
        notes: movement.notes.clone(),
        created_at: now,
    }
}

async fn append_adjustment(
    conn: &mut SqliteConnection,
    request: &AdjustmentRequest,
    applied: i64,
    balance_after: i64,
    now: DateTime<Utc>,
) -> StockResult<LedgerEntry> {
    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        product_id: request.product_id.clone(),
        warehouse_id: request.warehouse_id.clone(),
        entry_type: LedgerEntryType::Adjustment,
        delta: applied,
        balance_after,
        actor_id: request.actor_id.clone(),
        reference_type: None,
        reference_id: None,
        reason: Some(request.reason),
        notes: request.notes.clone(),
        created_at: now,
    };
    ledger::append(conn, &entry).await?;
    Ok(entry)
}

/// Fails with NotFound unless both product and warehouse exist and are active.
async fn ensure_active(
    conn: &mut SqliteConnection,
    product_id: &str,
    warehouse_id: &str,
) -> StockResult<()> {
    match catalog::fetch_product(&mut *conn, product_id).await? {
        Some(product) if product.is_active => {}
        _ => return Err(StockError::not_found("Product", product_id)),
    }
    match catalog::fetch_warehouse(&mut *conn, warehouse_id).await? {
        Some(warehouse) if warehouse.is_active => {}
        _ => return Err(StockError::not_found("Warehouse", warehouse_id)),
    }
    Ok(())
}

async fn existing_record(
    conn: &mut SqliteConnection,
    product_id: &str,
    warehouse_id: &str,
) -> StockResult<Option<StockRecord>> {
    ensure_active(conn, product_id, warehouse_id).await?;
    Ok(stock::fetch(&mut *conn, product_id, warehouse_id).await?)
}

/// Works out why a conditional debit matched no row.
async fn explain_failed_debit(
    conn: &mut SqliteConnection,
    product_id: &str,
    warehouse_id: &str,
    requested: i64,
) -> StockError {
    match existing_record(conn, product_id, warehouse_id).await {
        Err(err) => err,
        Ok(None) => StockError::not_found("StockRecord", pair_id(product_id, warehouse_id)),
        Ok(Some(record)) if record.quantity < requested => StockError::InsufficientStock {
            product_id: product_id.to_string(),
            warehouse_id: warehouse_id.to_string(),
            available: record.quantity,
            requested,
        },
        Ok(Some(_)) => StockError::Conflict { attempts: 1 },
    }
}

#[cfg(test)]
mod tests;
