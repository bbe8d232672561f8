//! # Adjustment Processor
//!
//! The single entry point for manual stock corrections. Every correction
//! carries a [`ReasonCode`] into its ledger entry.

use tracing::info;

use crate::engine::{StockCount, StockLedgerEngine};
use depot_core::{AdjustmentRequest, LedgerEntry, ReasonCode, StockResult};

#[derive(Debug, Clone)]
pub struct AdjustmentProcessor {
    engine: StockLedgerEngine,
}

impl AdjustmentProcessor {
    pub fn new(engine: StockLedgerEngine) -> Self {
        AdjustmentProcessor { engine }
    }

    /// Applies a signed correction.
    ///
    /// ## Returns
    /// * `Err(InvalidInput)` - `delta == 0`
    /// * `Err(InsufficientStock)` - negative delta larger than stock, unless
    ///   `allow_below_zero` is set (then the correction stops at zero)
    /// * `Err(NotFound)` - negative delta on a pair with no stock record
    pub async fn adjust(&self, request: &AdjustmentRequest) -> StockResult<LedgerEntry> {
        let entry = self.engine.adjust(request).await?;

        info!(
            product_id = %request.product_id,
            warehouse_id = %request.warehouse_id,
            requested = request.delta,
            applied = entry.delta,
            reason = ?request.reason,
            actor_id = %request.actor_id,
            "Adjustment recorded"
        );
        Ok(entry)
    }

    /// Records opening stock for a pair (INITIAL_STOCK).
    pub async fn initial_stock(
        &self,
        product_id: &str,
        warehouse_id: &str,
        quantity: i64,
        actor_id: &str,
    ) -> StockResult<LedgerEntry> {
        self.adjust(&AdjustmentRequest {
            product_id: product_id.to_string(),
            warehouse_id: warehouse_id.to_string(),
            delta: quantity,
            reason: ReasonCode::InitialStock,
            actor_id: actor_id.to_string(),
            notes: None,
            allow_below_zero: false,
        })
        .await
    }

    /// Sets stock to a physically counted quantity (STOCK_COUNT).
    ///
    /// The delta is `counted - current`, applied only if the quantity did
    /// not change between reading and writing. Counting the current quantity
    /// again is rejected as `InvalidInput`.
    pub async fn count(
        &self,
        product_id: &str,
        warehouse_id: &str,
        counted: i64,
        actor_id: &str,
        notes: Option<&str>,
    ) -> StockResult<LedgerEntry> {
        let entry = self
            .engine
            .count(&StockCount {
                product_id,
                warehouse_id,
                counted,
                actor_id,
                notes,
            })
            .await?;

        info!(
            product_id,
            warehouse_id,
            counted,
            delta = entry.delta,
            actor_id,
            "Stock count recorded"
        );
        Ok(entry)
    }
}
