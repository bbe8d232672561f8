//! # Shift Types
//!
//! A shift is a bounded POS cash session for one cashier at one warehouse.
//!
//! ## State Machine
//! ```text
//!   start()                       end()
//!  ───────►  OPEN  ──────────────────────────►  CLOSED (terminal, immutable)
//!             │  ▲
//!             └──┘ record_sale(): total_sales += amount, transaction_count += 1
//! ```
//!
//! At close: `expected = start_amount + total_sales` and
//! `variance = end_amount - expected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShiftStatus {
    #[default]
    Open,
    Closed,
}

/// A POS cash session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: String,
    pub warehouse_id: String,
    pub cashier_id: String,
    pub status: ShiftStatus,
    /// Float counted into the drawer at start.
    pub start_amount_cents: i64,
    #[ts(as = "String")]
    pub start_time: DateTime<Utc>,
    /// Cash counted at close.
    pub end_amount_cents: Option<i64>,
    #[ts(as = "Option<String>")]
    pub end_time: Option<DateTime<Utc>>,
    pub total_sales_cents: i64,
    pub transaction_count: i64,
    /// `start_amount + total_sales`, set at close.
    pub expected_amount_cents: Option<i64>,
    /// `end_amount - expected`, set at close.
    pub variance_cents: Option<i64>,
    pub notes: Option<String>,
}

impl Shift {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == ShiftStatus::Open
    }

    /// Cash the drawer should hold right now.
    pub fn expected_amount(&self) -> Money {
        Money::from_cents(self.start_amount_cents + self.total_sales_cents)
    }

    /// Variance against a counted amount.
    pub fn variance_for(&self, counted: Money) -> Money {
        counted - self.expected_amount()
    }
}
