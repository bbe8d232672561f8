//! # Validation Module
//!
//! Input rules checked before any stock is touched.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure, before any transaction is opened)         │
//! │  ├── ids present, quantities positive, rates in range                  │
//! │  └── failures become StockError::InvalidInput                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Existence checks in depot-db (product, warehouse, shift)     │
//! │  └── failures become StockError::NotFound                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── UNIQUE (product_id, warehouse_id), partial UNIQUE on open shifts  │
//! │  └── append-only triggers on ledger_entries                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::invoice::SaleRequest;
use crate::types::{AdjustmentRequest, Rate, StockMovement};
use crate::MAX_INVOICE_LINES;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest identifier accepted.
pub const MAX_ID_LEN: usize = 64;

/// Largest quantity a single movement, adjustment or count may carry.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

// =============================================================================
// Scalars
// =============================================================================

/// Validates an identifier (product, warehouse, actor, ...).
///
/// ## Example
/// ```rust
/// use depot_core::validation::validate_id;
///
/// assert!(validate_id("WH-1", "warehouse_id").is_ok());
/// assert!(validate_id("  ", "warehouse_id").is_err());
/// ```
pub fn validate_id(id: &str, field: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

/// Validates a quantity that must be strictly positive.
pub fn validate_quantity(qty: i64, field: &str) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    if qty > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an adjustment delta (any sign, never zero).
pub fn validate_delta(delta: i64, field: &str) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: field.to_string(),
        });
    }
    if delta.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: -MAX_QUANTITY,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an absolute stock level (counts): zero up to [`MAX_QUANTITY`].
pub fn validate_stock_level(value: i64, field: &str) -> ValidationResult<()> {
    if !(0..=MAX_QUANTITY).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount that may be zero but not negative.
///
/// ## Example
/// ```rust
/// use depot_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative(0, "start_amount").is_ok());
/// assert!(validate_non_negative(-100, "start_amount").is_err());
/// ```
pub fn validate_non_negative(value: i64, field: &str) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a rate in basis points (0% to 100%).
pub fn validate_rate_bps(bps: u32, field: &str) -> ValidationResult<()> {
    if bps > Rate::MAX_BPS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Rate::MAX_BPS as i64,
        });
    }

    Ok(())
}

/// Validates optional min/max stock thresholds.
pub fn validate_thresholds(min: Option<i64>, max: Option<i64>) -> ValidationResult<()> {
    if let Some(min) = min {
        validate_non_negative(min, "min_stock")?;
    }
    if let Some(max) = max {
        validate_non_negative(max, "max_stock")?;
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ValidationError::OutOfRange {
                field: "min_stock".to_string(),
                min: 0,
                max,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Requests
// =============================================================================

/// Validates a debit/credit request.
pub fn validate_movement(movement: &StockMovement) -> ValidationResult<()> {
    validate_id(&movement.product_id, "product_id")?;
    validate_id(&movement.warehouse_id, "warehouse_id")?;
    validate_id(&movement.actor_id, "actor_id")?;
    validate_quantity(movement.quantity, "quantity")
}

/// Validates an adjustment request.
pub fn validate_adjustment(request: &AdjustmentRequest) -> ValidationResult<()> {
    validate_id(&request.product_id, "product_id")?;
    validate_id(&request.warehouse_id, "warehouse_id")?;
    validate_id(&request.actor_id, "actor_id")?;
    validate_delta(request.delta, "delta")
}

/// Validates the shape of a transfer.
pub fn validate_transfer(
    product_id: &str,
    source_warehouse_id: &str,
    dest_warehouse_id: &str,
    quantity: i64,
    actor_id: &str,
) -> ValidationResult<()> {
    validate_id(product_id, "product_id")?;
    validate_id(source_warehouse_id, "source_warehouse_id")?;
    validate_id(dest_warehouse_id, "dest_warehouse_id")?;
    validate_id(actor_id, "actor_id")?;
    validate_quantity(quantity, "quantity")?;

    if source_warehouse_id.trim() == dest_warehouse_id.trim() {
        return Err(ValidationError::MustDiffer {
            field: "dest_warehouse_id".to_string(),
            other: "source_warehouse_id".to_string(),
        });
    }

    Ok(())
}

/// Validates the structure of a sale request.
///
/// Line pricing rules (rates, discounts) are checked by
/// [`crate::pricing::price_line`]; product existence by the caller.
pub fn validate_sale_request(request: &SaleRequest) -> ValidationResult<()> {
    validate_id(&request.warehouse_id, "warehouse_id")?;
    validate_id(&request.actor_id, "actor_id")?;
    if let Some(customer_id) = &request.customer_id {
        validate_id(customer_id, "customer_id")?;
    }
    if let Some(shift_id) = &request.shift_id {
        validate_id(shift_id, "shift_id")?;
    }
    if let Some(paid) = request.amount_paid_cents {
        validate_non_negative(paid, "amount_paid")?;
    }

    if request.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }
    if request.lines.len() > MAX_INVOICE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_INVOICE_LINES as i64,
        });
    }

    for (index, line) in request.lines.iter().enumerate() {
        validate_id(&line.product_id, &format!("lines[{index}].product_id"))?;
        validate_quantity(line.quantity, &format!("lines[{index}].quantity"))?;
    }

    Ok(())
}
