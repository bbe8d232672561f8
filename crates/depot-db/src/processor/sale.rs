//! # Sale Processor
//!
//! Turns a multi-line sale into one atomic unit: every line is debited, the
//! invoice is written and the shift total moves, or nothing happens.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate request                        → InvalidInput             │
//! │  2. resolve products, price lines           → SaleRejected (NotFound)  │
//! │  3. settle payment, check shift             → InvalidInput/NoOpenShift │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── debit_in(line) for every line, collecting failures               │
//! │   ├── any failure?  ROLLBACK → SaleRejected { failures }               │
//! │   ├── INSERT invoice + items                                           │
//! │   ├── shift::add_sale (if shift_id)                                    │
//! │   └── outbox RECEIVABLE (if partially paid)                            │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines for the same product are debited in order, so a later line sees
//! the stock left by an earlier one.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::engine::retry::with_retry;
use crate::engine::{credit_in, debit_in};
use crate::error::DbError;
use crate::repository::{catalog, invoice, outbox, shift};
use depot_core::pricing::{invoice_totals, price_line, settle, PricedLine};
use depot_core::validation::{validate_id, validate_sale_request};
use depot_core::{
    CreditKind, DebitKind, Invoice, InvoiceDetail, InvoiceItem, InvoiceStatus, LineFailure,
    LineFailureReason, Money, ProductInfo, ReceivableEvent, Reference, ReferenceType, SaleLine,
    SaleRequest, StockError, StockMovement, StockResult, ValidationError,
};

#[derive(Debug, Clone)]
pub struct SaleProcessor {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SaleProcessor {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        SaleProcessor { pool, retry }
    }

    /// Records a sale.
    ///
    /// ## Returns
    /// * `Ok(InvoiceDetail)` - every line debited, invoice persisted
    /// * `Err(SaleRejected)` - one entry per failing line; no stock moved
    /// * `Err(InvalidInput)` - malformed request, or partial payment
    ///   without a customer
    /// * `Err(NoOpenShift)` - `shift_id` names a closed shift
    pub async fn process(&self, request: &SaleRequest) -> StockResult<InvoiceDetail> {
        validate_sale_request(request)?;

        match catalog::fetch_warehouse(&self.pool, &request.warehouse_id).await? {
            Some(warehouse) if warehouse.is_active => {}
            _ => return Err(StockError::not_found("Warehouse", &request.warehouse_id)),
        }

        let priced = self.price_lines(request).await?;
        let totals = invoice_totals(&priced.iter().map(|(_, line)| *line).collect::<Vec<_>>())?;

        let paid = request
            .amount_paid_cents
            .map(Money::from_cents)
            .unwrap_or(totals.total);
        let (status, balance_due) = settle(totals.total, Some(paid));
        if balance_due.is_positive() && request.customer_id.is_none() {
            return Err(
                ValidationError::not_allowed("customer_id", "required for partial payment").into(),
            );
        }

        if let Some(shift_id) = &request.shift_id {
            self.check_shift(shift_id, &request.warehouse_id).await?;
        }

        let now = Utc::now();
        let invoice_id = Uuid::new_v4().to_string();
        let detail = InvoiceDetail {
            invoice: Invoice {
                id: invoice_id.clone(),
                customer_id: request.customer_id.clone(),
                warehouse_id: request.warehouse_id.clone(),
                user_id: request.actor_id.clone(),
                shift_id: request.shift_id.clone(),
                status,
                subtotal_cents: totals.subtotal.cents(),
                discount_cents: totals.discount.cents(),
                tax_cents: totals.tax.cents(),
                total_cents: totals.total.cents(),
                amount_paid_cents: paid.cents(),
                notes: request.notes.clone(),
                created_at: now,
                updated_at: now,
            },
            items: priced
                .iter()
                .enumerate()
                .map(|(index, (product, line))| {
                    invoice_item(&invoice_id, index, product, &request.lines[index], line)
                })
                .collect(),
        };

        // Cash taken at the till; the unpaid balance goes to the customer ledger.
        let collected = totals.total - balance_due;

        let pending = &detail;
        with_retry(&self.retry, "sale", move || {
            self.commit_sale(pending, balance_due, collected)
        })
        .await?;

        info!(
            invoice_id = %invoice_id,
            warehouse_id = %request.warehouse_id,
            lines = detail.items.len(),
            total = %totals.total,
            status = ?status,
            "Sale recorded"
        );
        Ok(detail)
    }

    /// Cancels an invoice and credits every line back (IMPORT, referenced
    /// as INVOICE_CANCEL).
    ///
    /// Shift totals are left as recorded; a refund is a till operation.
    pub async fn cancel(&self, invoice_id: &str, actor_id: &str) -> StockResult<Invoice> {
        validate_id(invoice_id, "invoice_id")?;
        validate_id(actor_id, "actor_id")?;

        let invoice =
            with_retry(&self.retry, "cancel", move || self.cancel_once(invoice_id, actor_id))
                .await?;

        info!(invoice_id, actor_id, total = invoice.total_cents, "Invoice canceled");
        Ok(invoice)
    }

    pub async fn get(&self, invoice_id: &str) -> StockResult<InvoiceDetail> {
        let Some(invoice) = invoice::fetch(&self.pool, invoice_id).await? else {
            return Err(StockError::not_found("Invoice", invoice_id));
        };
        let items = invoice::fetch_items(&self.pool, invoice_id).await?;
        Ok(InvoiceDetail { invoice, items })
    }

    /// Looks up every line's product and prices it. Unknown or inactive
    /// products reject the whole sale.
    async fn price_lines(
        &self,
        request: &SaleRequest,
    ) -> StockResult<Vec<(ProductInfo, PricedLine)>> {
        let mut priced = Vec::with_capacity(request.lines.len());
        let mut failures = Vec::new();

        for (index, line) in request.lines.iter().enumerate() {
            match catalog::fetch_product(&self.pool, &line.product_id).await? {
                Some(product) if product.is_active => {
                    let amounts = price_line(line, product.tax_rate(), &format!("lines[{index}]"))?;
                    priced.push((product, amounts));
                }
                _ => failures.push(LineFailure {
                    line_index: index as u32,
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    reason: LineFailureReason::NotFound {
                        entity: "Product".to_string(),
                    },
                }),
            }
        }

        if !failures.is_empty() {
            warn!(
                warehouse_id = %request.warehouse_id,
                failed_lines = failures.len(),
                "Sale rejected: unknown products"
            );
            return Err(StockError::SaleRejected { failures });
        }

        Ok(priced)
    }

    async fn check_shift(&self, shift_id: &str, warehouse_id: &str) -> StockResult<()> {
        let shift = shift::fetch(&self.pool, shift_id)
            .await?
            .ok_or_else(|| StockError::not_found("Shift", shift_id))?;

        if !shift.is_open() {
            return Err(StockError::NoOpenShift {
                shift_id: shift_id.to_string(),
            });
        }
        if shift.warehouse_id != warehouse_id {
            return Err(
                ValidationError::not_allowed("shift_id", "shift belongs to another warehouse")
                    .into(),
            );
        }
        Ok(())
    }

    async fn commit_sale(
        &self,
        detail: &InvoiceDetail,
        balance_due: Money,
        collected: Money,
    ) -> StockResult<()> {
        let invoice = &detail.invoice;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let failures = debit_lines(&mut tx, invoice, &detail.items).await?;
        if !failures.is_empty() {
            tx.rollback().await.map_err(DbError::from)?;
            warn!(
                invoice_id = %invoice.id,
                failed_lines = failures.len(),
                "Sale rejected: stock unavailable"
            );
            return Err(StockError::SaleRejected { failures });
        }

        invoice::insert(&mut tx, invoice, &detail.items).await?;

        if let Some(shift_id) = &invoice.shift_id {
            if !shift::add_sale(&mut tx, shift_id, collected.cents()).await? {
                return Err(StockError::NoOpenShift {
                    shift_id: shift_id.clone(),
                });
            }
        }

        if let (true, Some(customer_id)) = (balance_due.is_positive(), &invoice.customer_id) {
            let event = ReceivableEvent {
                customer_id: customer_id.clone(),
                invoice_id: invoice.id.clone(),
                delta_cents: balance_due.cents(),
                created_at: invoice.created_at,
            };
            outbox::enqueue(&mut tx, ReceivableEvent::EVENT_TYPE, &invoice.id, &event).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn cancel_once(&self, invoice_id: &str, actor_id: &str) -> StockResult<Invoice> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let mut invoice = invoice::fetch(&mut *tx, invoice_id)
            .await?
            .ok_or_else(|| StockError::not_found("Invoice", invoice_id))?;
        if invoice.status == InvoiceStatus::Canceled {
            return Err(ValidationError::not_allowed("status", "invoice is already canceled").into());
        }

        if !invoice::mark_canceled(&mut tx, invoice_id, now).await? {
            return Err(StockError::Conflict { attempts: 1 });
        }

        let items = invoice::fetch_items(&mut *tx, invoice_id).await?;
        for item in &items {
            let movement = StockMovement::new(
                &item.product_id,
                &invoice.warehouse_id,
                item.quantity,
                actor_id,
            )
            .with_reference(Reference::new(ReferenceType::InvoiceCancel, invoice_id));
            credit_in(&mut tx, &movement, CreditKind::Import).await?;
        }

        let balance_due = invoice.balance_due();
        if let (true, Some(customer_id)) = (balance_due.is_positive(), &invoice.customer_id) {
            let event = ReceivableEvent {
                customer_id: customer_id.clone(),
                invoice_id: invoice.id.clone(),
                delta_cents: -balance_due.cents(),
                created_at: now,
            };
            outbox::enqueue(&mut tx, ReceivableEvent::EVENT_TYPE, &invoice.id, &event).await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        invoice.status = InvoiceStatus::Canceled;
        invoice.updated_at = now;
        Ok(invoice)
    }
}

/// Debits every line on the open transaction.
///
/// Stock shortfalls and missing records are collected per line; any other
/// error aborts the attempt.
async fn debit_lines(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    items: &[InvoiceItem],
) -> StockResult<Vec<LineFailure>> {
    let mut failures = Vec::new();

    for item in items {
        let movement = StockMovement::new(
            &item.product_id,
            &invoice.warehouse_id,
            item.quantity,
            &invoice.user_id,
        )
        .with_reference(Reference::invoice(&invoice.id));

        let reason = match debit_in(conn, &movement, DebitKind::Export).await {
            Ok(entry) => {
                debug!(line = item.line_index, balance = entry.balance_after, "Line debited");
                continue;
            }
            Err(StockError::InsufficientStock { available, .. }) => {
                LineFailureReason::InsufficientStock { available }
            }
            Err(StockError::NotFound { entity, .. }) => LineFailureReason::NotFound { entity },
            Err(other) => return Err(other),
        };

        failures.push(LineFailure {
            line_index: item.line_index as u32,
            product_id: item.product_id.clone(),
            requested: item.quantity,
            reason,
        });
    }

    Ok(failures)
}

fn invoice_item(
    invoice_id: &str,
    index: usize,
    product: &ProductInfo,
    line: &SaleLine,
    priced: &PricedLine,
) -> InvoiceItem {
    InvoiceItem {
        id: Uuid::new_v4().to_string(),
        invoice_id: invoice_id.to_string(),
        line_index: index as i64,
        product_id: product.id.clone(),
        sku_snapshot: product.sku.clone(),
        quantity: line.quantity,
        unit_price_cents: line.unit_price_cents,
        cost_cents: product.cost_cents,
        discount_rate_bps: i64::from(priced.discount_rate.bps()),
        discount_cents: priced.discount.cents(),
        tax_rate_bps: i64::from(priced.tax_rate.bps()),
        tax_cents: priced.tax.cents(),
        subtotal_cents: priced.subtotal.cents(),
        total_cents: priced.total.cents(),
    }
}

#[cfg(test)]
mod tests;
