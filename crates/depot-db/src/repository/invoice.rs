//! # Invoice Repository
//!
//! Invoice headers and their line snapshots.
//!
//! ## Invoice Lifecycle
//! ```text
//!   SaleProcessor::process ──► pending | paid
//!                                  │
//!   SaleProcessor::cancel  ────────┴──► canceled (terminal)
//! ```
//! Lines are written once with the header and never updated.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use depot_core::{Invoice, InvoiceDetail, InvoiceItem, InvoiceStatus};

const INVOICE_COLUMNS: &str = "id, customer_id, warehouse_id, user_id, shift_id, status, \
     subtotal_cents, discount_cents, tax_cents, total_cents, amount_paid_cents, notes, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, invoice_id, line_index, product_id, sku_snapshot, quantity, \
     unit_price_cents, cost_cents, discount_rate_bps, discount_cents, tax_rate_bps, tax_cents, \
     subtotal_cents, total_cents";

/// Read access to invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Gets an invoice header with its lines.
    pub async fn get_detail(&self, id: &str) -> DbResult<Option<InvoiceDetail>> {
        let Some(invoice) = fetch(&self.pool, id).await? else {
            return Ok(None);
        };
        let items = fetch_items(&self.pool, id).await?;

        Ok(Some(InvoiceDetail { invoice, items }))
    }

    /// Invoices recorded during a shift, oldest first.
    pub async fn list_by_shift(&self, shift_id: &str) -> DbResult<Vec<Invoice>> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE shift_id = ? ORDER BY created_at ASC"
        ))
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(invoices)
    }

    /// Total number of invoices.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

pub(crate) async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Invoice>>
where
    E: SqliteExecutor<'e>,
{
    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(invoice)
}

pub(crate) async fn fetch_items<'e, E>(executor: E, invoice_id: &str) -> DbResult<Vec<InvoiceItem>>
where
    E: SqliteExecutor<'e>,
{
    let items = sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = ? ORDER BY line_index"
    ))
    .bind(invoice_id)
    .fetch_all(executor)
    .await?;

    Ok(items)
}

/// Inserts a header and all of its lines on the caller's transaction.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    items: &[InvoiceItem],
) -> DbResult<()> {
    debug!(id = %invoice.id, lines = items.len(), status = ?invoice.status, "Inserting invoice");

    sqlx::query(
        "INSERT INTO invoices (
            id, customer_id, warehouse_id, user_id, shift_id, status,
            subtotal_cents, discount_cents, tax_cents, total_cents, amount_paid_cents,
            notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )
    .bind(&invoice.id)
    .bind(&invoice.customer_id)
    .bind(&invoice.warehouse_id)
    .bind(&invoice.user_id)
    .bind(&invoice.shift_id)
    .bind(invoice.status)
    .bind(invoice.subtotal_cents)
    .bind(invoice.discount_cents)
    .bind(invoice.tax_cents)
    .bind(invoice.total_cents)
    .bind(invoice.amount_paid_cents)
    .bind(&invoice.notes)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in items {
        sqlx::query(
            "INSERT INTO invoice_items (
                id, invoice_id, line_index, product_id, sku_snapshot, quantity,
                unit_price_cents, cost_cents, discount_rate_bps, discount_cents,
                tax_rate_bps, tax_cents, subtotal_cents, total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&item.id)
        .bind(&item.invoice_id)
        .bind(item.line_index)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.cost_cents)
        .bind(item.discount_rate_bps)
        .bind(item.discount_cents)
        .bind(item.tax_rate_bps)
        .bind(item.tax_cents)
        .bind(item.subtotal_cents)
        .bind(item.total_cents)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Moves a non-canceled invoice to `canceled`. Returns false if it was
/// already canceled (or does not exist).
pub(crate) async fn mark_canceled(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE invoices SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status <> ?2",
    )
    .bind(id)
    .bind(InvoiceStatus::Canceled)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
