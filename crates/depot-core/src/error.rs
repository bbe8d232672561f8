//! # Error Types
//!
//! The error taxonomy of the stock ledger.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  depot-core errors (this file)                                         │
//! │  ├── StockError       - Everything a ledger caller can observe         │
//! │  └── ValidationError  - Input validation failures (→ InvalidInput)     │
//! │                                                                         │
//! │  depot-db errors (separate crate)                                      │
//! │  └── DbError          - sqlx failures, folded into StockError          │
//! │                                                                         │
//! │  Flow: ValidationError → StockError ← DbError                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only [`StockError::Conflict`] is retryable. Validation failures and
//! missing entities are raised before any mutation is attempted.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Stock Error
// =============================================================================

/// Errors surfaced by the engine, the processors and the shift register.
#[derive(Debug, Clone, Error)]
pub enum StockError {
    /// A referenced entity (stock record, product, warehouse, invoice,
    /// shift) does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Not enough stock to satisfy a debit.
    ///
    /// `available` is the quantity observed when the conditional update
    /// failed, so callers can report partial availability.
    #[error(
        "Insufficient stock for product {product_id} at warehouse {warehouse_id}: \
         available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: String,
        warehouse_id: String,
        available: i64,
        requested: i64,
    },

    /// Input rejected before any mutation.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Optimistic-concurrency failure that survived every retry.
    #[error("Write conflict persisted after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// An OPEN shift already exists for this warehouse and cashier.
    #[error("Shift already open for cashier {cashier_id} at warehouse {warehouse_id}")]
    ShiftAlreadyOpen {
        warehouse_id: String,
        cashier_id: String,
    },

    /// The shift is closed (or was never opened).
    #[error("Shift {shift_id} is not open")]
    NoOpenShift { shift_id: String },

    /// The second leg of a transfer failed.
    ///
    /// `compensated == true` means the source was credited back and both
    /// warehouses hold their original quantities. `compensated == false`
    /// is a reconciliation incident that needs manual attention.
    #[error(
        "Transfer {transfer_id} failed at {leg} leg (compensated: {compensated}): {cause}"
    )]
    TransferPartialFailure {
        transfer_id: String,
        leg: TransferLeg,
        compensated: bool,
        cause: String,
    },

    /// One or more invoice lines could not be debited; nothing was written.
    #[error("Sale rejected: {} line(s) failed", .failures.len())]
    SaleRejected { failures: Vec<LineFailure> },

    /// Stored quantity disagrees with the sum of ledger deltas.
    #[error(
        "Ledger drift for product {product_id} at warehouse {warehouse_id}: \
         stored {stored}, ledger sum {ledger_sum}"
    )]
    LedgerDrift {
        product_id: String,
        warehouse_id: String,
        stored: i64,
        ledger_sum: i64,
    },

    /// Storage layer failure that is not a business outcome.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StockError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StockError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if repeating the operation may change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StockError::Conflict { .. })
    }
}

/// Which leg of a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransferLeg {
    /// Debit from the source warehouse.
    Debit,
    /// Credit into the destination warehouse.
    Credit,
}

impl std::fmt::Display for TransferLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferLeg::Debit => write!(f, "debit"),
            TransferLeg::Credit => write!(f, "credit"),
        }
    }
}

// =============================================================================
// Sale line failures
// =============================================================================

/// One failing line of a rejected sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineFailure {
    /// Zero-based position of the line in the request.
    pub line_index: u32,
    pub product_id: String,
    pub requested: i64,
    pub reason: LineFailureReason,
}

/// Why a sale line could not be fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineFailureReason {
    /// Product unknown to the catalog, or no stock record at the warehouse.
    NotFound { entity: String },
    /// Less stock than requested once earlier lines were applied.
    InsufficientStock { available: i64 },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before any stock is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Two fields must hold different values.
    #[error("{field} must differ from {other}")]
    MustDiffer { field: String, other: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Operation not allowed in the current state.
    #[error("{field}: {reason}")]
    NotAllowed { field: String, reason: String },
}

impl ValidationError {
    pub fn not_allowed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::NotAllowed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with StockError.
pub type StockResult<T> = Result<T, StockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StockError::InsufficientStock {
            product_id: "X".to_string(),
            warehouse_id: "A".to_string(),
            available: 5,
            requested: 20,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product X at warehouse A: available 5, requested 20"
        );

        let err = StockError::TransferPartialFailure {
            transfer_id: "t-1".to_string(),
            leg: TransferLeg::Credit,
            compensated: true,
            cause: "warehouse inactive".to_string(),
        };
        assert!(err.to_string().contains("credit leg"));
        assert!(err.to_string().contains("compensated: true"));
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(StockError::Conflict { attempts: 3 }.is_retryable());
        assert!(!StockError::InsufficientStock {
            product_id: "X".into(),
            warehouse_id: "A".into(),
            available: 2,
            requested: 3,
        }
        .is_retryable());
        assert!(!StockError::not_found("Product", "X").is_retryable());
        assert!(!StockError::Storage("disk".into()).is_retryable());
    }

    #[test]
    fn test_validation_converts_to_invalid_input() {
        let err: StockError = ValidationError::MustBeNonZero {
            field: "delta".to_string(),
        }
        .into();
        assert!(matches!(err, StockError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid input: delta must not be zero");
    }

    #[test]
    fn test_sale_rejected_counts_lines() {
        let err = StockError::SaleRejected {
            failures: vec![
                LineFailure {
                    line_index: 0,
                    product_id: "X".into(),
                    requested: 4,
                    reason: LineFailureReason::InsufficientStock { available: 1 },
                },
                LineFailure {
                    line_index: 2,
                    product_id: "Y".into(),
                    requested: 1,
                    reason: LineFailureReason::NotFound {
                        entity: "Product".into(),
                    },
                },
            ],
        };
        assert_eq!(err.to_string(), "Sale rejected: 2 line(s) failed");
    }
}
