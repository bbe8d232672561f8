//! # Domain Types
//!
//! Stock and ledger types shared by every Depot component.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  StockRecord    │   │  LedgerEntry    │   │ LedgerEntryType │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  product_id  ┐  │   │  id (UUID)      │   │  Export         │       │
//! │  │  warehouse_id┘  │◄──│  product_id     │   │  Import         │       │
//! │  │  quantity ≥ 0   │   │  warehouse_id   │   │  Adjustment     │       │
//! │  │  reserved       │   │  entry_type     │   │  TransferOut    │       │
//! │  │  min/max stock  │   │  delta (signed) │   │  TransferIn     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  quantity == Σ delta   for every (product_id, warehouse_id)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::StockError;

// =============================================================================
// Rate
// =============================================================================

/// A rate in basis points (bps).
///
/// 1 basis point = 0.01%, so 825 bps = 8.25%. Used for tax and discount rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Upper bound: 100%.
    pub const MAX_BPS: u32 = 10_000;

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Catalog (external collaborator view)
// =============================================================================

/// What the sale processor needs from the product catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductInfo {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Purchase cost in minor units, if known.
    pub cost_cents: Option<i64>,
    /// Default selling price in minor units.
    pub price_cents: i64,
    /// Default tax rate in basis points.
    pub tax_rate_bps: i64,
    pub is_active: bool,
}

impl ProductInfo {
    /// Returns the catalog tax rate, clamped into the valid range.
    pub fn tax_rate(&self) -> Rate {
        Rate::from_bps(self.tax_rate_bps.clamp(0, Rate::MAX_BPS as i64) as u32)
    }
}

/// A stock location.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Warehouse {
    pub id: String,
    /// Short business code, e.g. "WH-MAIN".
    pub code: String,
    pub name: String,
    /// Inactive warehouses accept no stock movements.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Record
// =============================================================================

/// Materialized quantity of one product at one warehouse.
///
/// Unique per `(product_id, warehouse_id)`. Created by the first movement for
/// that pair and never deleted; zero is a valid quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockRecord {
    pub product_id: String,
    pub warehouse_id: String,
    /// On-hand quantity, never negative.
    pub quantity: i64,
    /// Quantity promised to pending orders (informational).
    pub reserved_quantity: i64,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    /// Bumped on every quantity change; used for optimistic guards.
    pub version: i64,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl StockRecord {
    /// Quantity not promised to anyone.
    pub fn unreserved(&self) -> i64 {
        (self.quantity - self.reserved_quantity).max(0)
    }

    /// True when a minimum is configured and the quantity is below it.
    pub fn is_below_minimum(&self) -> bool {
        matches!(self.min_stock, Some(min) if self.quantity < min)
    }

    /// True when a maximum is configured and the quantity is above it.
    pub fn is_above_maximum(&self) -> bool {
        matches!(self.max_stock, Some(max) if self.quantity > max)
    }
}

// =============================================================================
// Ledger Entry Type
// =============================================================================

/// Kind of quantity mutation recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    /// Stock leaving through a sale.
    Export,
    /// Stock arriving (purchase receipt, customer return, cancellation).
    Import,
    /// Manual correction with a reason code.
    Adjustment,
    /// Source leg of an inter-warehouse transfer.
    TransferOut,
    /// Destination leg of a transfer, or its compensation.
    TransferIn,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Export => "EXPORT",
            LedgerEntryType::Import => "IMPORT",
            LedgerEntryType::Adjustment => "ADJUSTMENT",
            LedgerEntryType::TransferOut => "TRANSFER_OUT",
            LedgerEntryType::TransferIn => "TRANSFER_IN",
        }
    }
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry types a debit may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebitKind {
    Export,
    TransferOut,
}

impl From<DebitKind> for LedgerEntryType {
    fn from(kind: DebitKind) -> Self {
        match kind {
            DebitKind::Export => LedgerEntryType::Export,
            DebitKind::TransferOut => LedgerEntryType::TransferOut,
        }
    }
}

/// Entry types a credit may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditKind {
    Import,
    TransferIn,
}

impl From<CreditKind> for LedgerEntryType {
    fn from(kind: CreditKind) -> Self {
        match kind {
            CreditKind::Import => LedgerEntryType::Import,
            CreditKind::TransferIn => LedgerEntryType::TransferIn,
        }
    }
}

// =============================================================================
// Reason Codes & References
// =============================================================================

/// Why a manual adjustment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    StockCount,
    DamageExpiry,
    ReturnToSupplier,
    Administrative,
    InitialStock,
    Other,
}

/// What kind of document caused a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Invoice,
    InvoiceCancel,
    Transfer,
    TransferCompensation,
}

/// Link from a ledger entry to the document that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reference {
    pub kind: ReferenceType,
    pub id: String,
}

impl Reference {
    pub fn new(kind: ReferenceType, id: impl Into<String>) -> Self {
        Reference {
            kind,
            id: id.into(),
        }
    }

    pub fn invoice(id: impl Into<String>) -> Self {
        Reference::new(ReferenceType::Invoice, id)
    }

    pub fn transfer(id: impl Into<String>) -> Self {
        Reference::new(ReferenceType::Transfer, id)
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// One immutable quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    pub product_id: String,
    pub warehouse_id: String,
    pub entry_type: LedgerEntryType,
    /// Signed quantity change.
    pub delta: i64,
    /// Quantity on the stock record right after this entry was applied.
    pub balance_after: i64,
    pub actor_id: String,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<String>,
    /// Only set for adjustments.
    pub reason: Option<ReasonCode>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn reference(&self) -> Option<Reference> {
        match (self.reference_type, &self.reference_id) {
            (Some(kind), Some(id)) => Some(Reference::new(kind, id.clone())),
            _ => None,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Input to `debit` / `credit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: String,
    pub warehouse_id: String,
    /// Must be positive.
    pub quantity: i64,
    pub actor_id: String,
    pub reference: Option<Reference>,
    pub notes: Option<String>,
}

impl StockMovement {
    pub fn new(
        product_id: impl Into<String>,
        warehouse_id: impl Into<String>,
        quantity: i64,
        actor_id: impl Into<String>,
    ) -> Self {
        StockMovement {
            product_id: product_id.into(),
            warehouse_id: warehouse_id.into(),
            quantity,
            actor_id: actor_id.into(),
            reference: None,
            notes: None,
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Input to a manual adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub product_id: String,
    pub warehouse_id: String,
    /// Signed, non-zero.
    pub delta: i64,
    pub reason: ReasonCode,
    pub actor_id: String,
    pub notes: Option<String>,
    /// Clamp a negative delta at zero instead of failing.
    pub allow_below_zero: bool,
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Result of comparing a stock record with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconciliationReport {
    pub product_id: String,
    pub warehouse_id: String,
    pub stored_quantity: i64,
    pub ledger_sum: i64,
    /// `stored_quantity - ledger_sum`.
    pub drift: i64,
}

impl ReconciliationReport {
    pub fn new(
        product_id: impl Into<String>,
        warehouse_id: impl Into<String>,
        stored_quantity: i64,
        ledger_sum: i64,
    ) -> Self {
        ReconciliationReport {
            product_id: product_id.into(),
            warehouse_id: warehouse_id.into(),
            stored_quantity,
            ledger_sum,
            drift: stored_quantity - ledger_sum,
        }
    }

    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.drift == 0
    }

    /// Turns a drifted report into [`StockError::LedgerDrift`].
    pub fn ensure_consistent(&self) -> Result<(), StockError> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(StockError::LedgerDrift {
            product_id: self.product_id.clone(),
            warehouse_id: self.warehouse_id.clone(),
            stored: self.stored_quantity,
            ledger_sum: self.ledger_sum,
        })
    }
}

// =============================================================================
// Transfers
// =============================================================================

/// Input to the transfer processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferRequest {
    pub product_id: String,
    pub source_warehouse_id: String,
    pub dest_warehouse_id: String,
    pub quantity: i64,
    pub actor_id: String,
    pub notes: Option<String>,
}

/// Both legs of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferReceipt {
    /// Reference id shared by every ledger entry of the transfer.
    pub transfer_id: String,
    /// TRANSFER_OUT at the source.
    pub outbound: LedgerEntry,
    /// TRANSFER_IN at the destination.
    pub inbound: LedgerEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quantity: i64, min: Option<i64>, max: Option<i64>) -> StockRecord {
        StockRecord {
            product_id: "X".into(),
            warehouse_id: "A".into(),
            quantity,
            reserved_quantity: 2,
            min_stock: min,
            max_stock: max,
            version: 0,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_thresholds() {
        assert!(record(3, Some(5), None).is_below_minimum());
        assert!(!record(5, Some(5), None).is_below_minimum());
        assert!(record(11, None, Some(10)).is_above_maximum());
        assert!(!record(11, None, None).is_above_maximum());
    }

    #[test]
    fn test_unreserved_never_negative() {
        assert_eq!(record(5, None, None).unreserved(), 3);
        assert_eq!(record(1, None, None).unreserved(), 0);
    }

    #[test]
    fn test_entry_kinds_map_to_entry_types() {
        assert_eq!(LedgerEntryType::from(DebitKind::Export), LedgerEntryType::Export);
        assert_eq!(
            LedgerEntryType::from(DebitKind::TransferOut),
            LedgerEntryType::TransferOut
        );
        assert_eq!(
            LedgerEntryType::from(CreditKind::TransferIn),
            LedgerEntryType::TransferIn
        );
        assert_eq!(LedgerEntryType::TransferOut.to_string(), "TRANSFER_OUT");
    }

    #[test]
    fn test_reason_code_wire_format() {
        let json = serde_json::to_string(&ReasonCode::DamageExpiry).unwrap();
        assert_eq!(json, "\"DAMAGE_EXPIRY\"");
        let back: ReasonCode = serde_json::from_str("\"INITIAL_STOCK\"").unwrap();
        assert_eq!(back, ReasonCode::InitialStock);
    }

    #[test]
    fn test_reconciliation_report() {
        let ok = ReconciliationReport::new("X", "A", 5, 5);
        assert!(ok.is_consistent());

        let drift = ReconciliationReport::new("X", "A", 7, 5);
        assert_eq!(drift.drift, 2);
        assert!(!drift.is_consistent());

        assert!(ok.ensure_consistent().is_ok());
        assert!(matches!(
            drift.ensure_consistent(),
            Err(StockError::LedgerDrift { stored: 7, ledger_sum: 5, .. })
        ));
    }
}
