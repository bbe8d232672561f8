//! # Invoice Types
//!
//! Sale requests coming in and the invoices persisted for them.
//!
//! ## Snapshot Pattern
//! Each [`InvoiceItem`] freezes the SKU, cost and the rates used at the time
//! of sale, so later catalog edits never rewrite history. Line quantities are
//! immutable once the invoice exists; only the header status may change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Invoice Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Not (fully) paid yet.
    #[default]
    Pending,
    /// Paid in full.
    Paid,
    /// Canceled; stock was credited back.
    Canceled,
}

// =============================================================================
// Requests
// =============================================================================

/// One requested invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Discount as a rate; ignored when `discount_cents` is given.
    pub discount_rate_bps: Option<u32>,
    /// Explicit discount amount for the whole line.
    pub discount_cents: Option<i64>,
    /// Tax rate; defaults to the catalog rate when absent.
    pub tax_rate_bps: Option<u32>,
    /// Explicit tax amount for the whole line.
    pub tax_cents: Option<i64>,
}

impl SaleLine {
    /// A line with no discount and catalog tax.
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_price_cents: i64) -> Self {
        SaleLine {
            product_id: product_id.into(),
            quantity,
            unit_price_cents,
            discount_rate_bps: None,
            discount_cents: None,
            tax_rate_bps: None,
            tax_cents: None,
        }
    }
}

/// A complete invoice request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub warehouse_id: String,
    /// Cashier or clerk recording the sale.
    pub actor_id: String,
    pub customer_id: Option<String>,
    pub shift_id: Option<String>,
    pub lines: Vec<SaleLine>,
    /// Amount received; `None` means paid in full.
    pub amount_paid_cents: Option<i64>,
    pub notes: Option<String>,
}

// =============================================================================
// Invoice
// =============================================================================

/// Invoice header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub customer_id: Option<String>,
    pub warehouse_id: String,
    pub user_id: String,
    pub shift_id: Option<String>,
    pub status: InvoiceStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Amount still owed by the customer.
    pub fn balance_due(&self) -> Money {
        Money::from_cents((self.total_cents - self.amount_paid_cents).max(0))
    }
}

/// A persisted invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceItem {
    pub id: String,
    pub invoice_id: String,
    pub line_index: i64,
    pub product_id: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Catalog cost at time of sale (frozen).
    pub cost_cents: Option<i64>,
    pub discount_rate_bps: i64,
    pub discount_cents: i64,
    pub tax_rate_bps: i64,
    pub tax_cents: i64,
    /// unit price × quantity.
    pub subtotal_cents: i64,
    /// subtotal − discount + tax.
    pub total_cents: i64,
}

/// Header and lines together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

// =============================================================================
// Customer Ledger notification
// =============================================================================

/// Emitted when an invoice is paid only partially.
///
/// Depot does not own customer balances; this is handed to the customer
/// ledger through the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceivableEvent {
    pub customer_id: String,
    pub invoice_id: String,
    /// Amount the customer now owes, in minor units.
    pub delta_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl ReceivableEvent {
    /// Outbox event type.
    pub const EVENT_TYPE: &'static str = "RECEIVABLE";
}
