//! # Shift Register
//!
//! Cash sessions at a till. A cashier holds at most one OPEN shift per
//! warehouse; closing computes the expected drawer amount and the variance.
//!
//! ```text
//!   start ──► OPEN ──record_sale*──► end ──► CLOSED (immutable)
//!
//!   expected = start_amount + total_sales
//!   variance = end_amount − expected        (negative = drawer short)
//! ```
//!
//! The register never touches stock.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::repository::{CatalogRepository, ShiftRepository};
use depot_core::validation::{validate_id, validate_non_negative};
use depot_core::{Money, Shift, ShiftStatus, StockError, StockResult};

#[derive(Debug, Clone)]
pub struct ShiftRegister {
    shifts: ShiftRepository,
    catalog: CatalogRepository,
}

impl ShiftRegister {
    pub fn new(shifts: ShiftRepository, catalog: CatalogRepository) -> Self {
        ShiftRegister { shifts, catalog }
    }

    /// Opens a shift.
    ///
    /// ## Returns
    /// * `Err(ShiftAlreadyOpen)` - the cashier already has an OPEN shift here
    /// * `Err(NotFound)` - unknown or inactive warehouse
    pub async fn start(
        &self,
        warehouse_id: &str,
        cashier_id: &str,
        start_amount: Money,
        notes: Option<&str>,
    ) -> StockResult<Shift> {
        validate_id(warehouse_id, "warehouse_id")?;
        validate_id(cashier_id, "cashier_id")?;
        validate_non_negative(start_amount.cents(), "start_amount")?;

        match self.catalog.get_warehouse(warehouse_id).await? {
            Some(warehouse) if warehouse.is_active => {}
            _ => return Err(StockError::not_found("Warehouse", warehouse_id)),
        }

        let shift = Shift {
            id: Uuid::new_v4().to_string(),
            warehouse_id: warehouse_id.to_string(),
            cashier_id: cashier_id.to_string(),
            status: ShiftStatus::Open,
            start_amount_cents: start_amount.cents(),
            start_time: Utc::now(),
            end_amount_cents: None,
            end_time: None,
            total_sales_cents: 0,
            transaction_count: 0,
            expected_amount_cents: None,
            variance_cents: None,
            notes: notes.map(str::to_string),
        };

        match self.shifts.insert(&shift).await {
            Ok(()) => {}
            Err(err) if err.is_unique_violation() => {
                warn!(warehouse_id, cashier_id, "Shift already open");
                return Err(StockError::ShiftAlreadyOpen {
                    warehouse_id: warehouse_id.to_string(),
                    cashier_id: cashier_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            shift_id = %shift.id,
            warehouse_id,
            cashier_id,
            start_amount = %start_amount,
            "Shift opened"
        );
        Ok(shift)
    }

    /// Adds a sale amount to an OPEN shift.
    ///
    /// Sales made through [`crate::processor::SaleProcessor`] with a
    /// `shift_id` are recorded automatically in the sale's transaction.
    pub async fn record_sale(&self, shift_id: &str, amount: Money) -> StockResult<Shift> {
        validate_id(shift_id, "shift_id")?;
        validate_non_negative(amount.cents(), "amount")?;

        if !self.shifts.record_sale(shift_id, amount.cents()).await? {
            return Err(self.not_open(shift_id).await);
        }

        self.get(shift_id).await
    }

    /// Closes an OPEN shift with the counted drawer amount.
    pub async fn end(
        &self,
        shift_id: &str,
        end_amount: Money,
        notes: Option<&str>,
    ) -> StockResult<Shift> {
        validate_id(shift_id, "shift_id")?;
        validate_non_negative(end_amount.cents(), "end_amount")?;

        if !self
            .shifts
            .close(shift_id, end_amount.cents(), notes, Utc::now())
            .await?
        {
            return Err(self.not_open(shift_id).await);
        }

        let shift = self.get(shift_id).await?;
        let variance = shift.variance_cents.unwrap_or_default();
        if variance != 0 {
            warn!(
                shift_id,
                cashier_id = %shift.cashier_id,
                expected = ?shift.expected_amount_cents,
                end_amount = %end_amount,
                variance,
                "Shift closed with variance"
            );
        } else {
            info!(shift_id, cashier_id = %shift.cashier_id, "Shift closed");
        }

        Ok(shift)
    }

    pub async fn get(&self, shift_id: &str) -> StockResult<Shift> {
        self.shifts
            .find_by_id(shift_id)
            .await?
            .ok_or_else(|| StockError::not_found("Shift", shift_id))
    }

    /// The cashier's OPEN shift at a warehouse, if any.
    pub async fn current(&self, warehouse_id: &str, cashier_id: &str) -> StockResult<Option<Shift>> {
        Ok(self.shifts.find_open(warehouse_id, cashier_id).await?)
    }

    pub async fn list(&self, warehouse_id: &str, limit: u32) -> StockResult<Vec<Shift>> {
        Ok(self.shifts.list_by_warehouse(warehouse_id, limit).await?)
    }

    /// NotFound for a missing shift, NoOpenShift for a closed one.
    async fn not_open(&self, shift_id: &str) -> StockError {
        match self.shifts.find_by_id(shift_id).await {
            Ok(Some(_)) => StockError::NoOpenShift {
                shift_id: shift_id.to_string(),
            },
            Ok(None) => StockError::not_found("Shift", shift_id),
            Err(err) => err.into(),
        }
    }
}
