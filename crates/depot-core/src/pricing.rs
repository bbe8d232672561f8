//! # Invoice Pricing
//!
//! Pure line and header arithmetic for the sale processor.
//!
//! ```text
//! subtotal = unit_price × quantity
//! discount = discount_cents            (if given)
//!          | subtotal × discount_rate  (otherwise)
//! tax      = tax_cents                 (if given)
//!          | (subtotal − discount) × tax_rate
//! total    = subtotal − discount + tax
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::invoice::{InvoiceStatus, SaleLine};
use crate::money::Money;
use crate::types::Rate;
use crate::validation::{validate_non_negative, validate_rate_bps, ValidationResult};

/// Computed amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub subtotal: Money,
    pub discount_rate: Rate,
    pub discount: Money,
    pub tax_rate: Rate,
    pub tax: Money,
    pub total: Money,
}

/// Sums over all lines of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Prices a single line.
///
/// `catalog_tax` is used when the line carries neither a tax rate nor an
/// explicit tax amount. `field` prefixes validation messages, e.g. `lines[2]`.
pub fn price_line(line: &SaleLine, catalog_tax: Rate, field: &str) -> ValidationResult<PricedLine> {
    validate_non_negative(line.unit_price_cents, &format!("{field}.unit_price"))?;

    let subtotal = Money::from_cents(line.unit_price_cents)
        .checked_multiply_quantity(line.quantity)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: format!("{field}.unit_price"),
            min: 0,
            max: i64::MAX / line.quantity.max(1),
        })?;

    let discount_rate = match line.discount_rate_bps {
        Some(bps) => {
            validate_rate_bps(bps, &format!("{field}.discount_rate"))?;
            Rate::from_bps(bps)
        }
        None => Rate::zero(),
    };
    let discount = match line.discount_cents {
        Some(cents) => {
            validate_non_negative(cents, &format!("{field}.discount"))?;
            Money::from_cents(cents)
        }
        None => subtotal.apply_rate(discount_rate),
    };
    if discount > subtotal {
        return Err(ValidationError::OutOfRange {
            field: format!("{field}.discount"),
            min: 0,
            max: subtotal.cents(),
        });
    }

    let tax_rate = match line.tax_rate_bps {
        Some(bps) => {
            validate_rate_bps(bps, &format!("{field}.tax_rate"))?;
            Rate::from_bps(bps)
        }
        None => catalog_tax,
    };
    let taxable = subtotal - discount;
    let tax = match line.tax_cents {
        Some(cents) => {
            validate_non_negative(cents, &format!("{field}.tax"))?;
            Money::from_cents(cents)
        }
        None => taxable.apply_rate(tax_rate),
    };

    let total = taxable.checked_add(tax).ok_or_else(|| ValidationError::OutOfRange {
        field: format!("{field}.tax"),
        min: 0,
        max: i64::MAX - taxable.cents(),
    })?;

    Ok(PricedLine {
        subtotal,
        discount_rate,
        discount,
        tax_rate,
        tax,
        total,
    })
}

/// Adds up priced lines. Fails if any sum leaves the `i64` range.
pub fn invoice_totals(lines: &[PricedLine]) -> ValidationResult<InvoiceTotals> {
    let overflow = || ValidationError::OutOfRange {
        field: "lines".to_string(),
        min: 0,
        max: i64::MAX,
    };

    lines.iter().try_fold(InvoiceTotals::default(), |acc, line| {
        Ok(InvoiceTotals {
            subtotal: acc.subtotal.checked_add(line.subtotal).ok_or_else(overflow)?,
            discount: acc.discount.checked_add(line.discount).ok_or_else(overflow)?,
            tax: acc.tax.checked_add(line.tax).ok_or_else(overflow)?,
            total: acc.total.checked_add(line.total).ok_or_else(overflow)?,
        })
    })
}

/// Resolves the payment outcome of an invoice.
///
/// Returns the status and the amount left owing (zero when paid in full).
/// Overpayment is treated as paid in full; change is handled at the till.
pub fn settle(total: Money, amount_paid: Option<Money>) -> (InvoiceStatus, Money) {
    let paid = amount_paid.unwrap_or(total);
    if paid >= total {
        (InvoiceStatus::Paid, Money::zero())
    } else {
        (InvoiceStatus::Pending, total - paid)
    }
}
