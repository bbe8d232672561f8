//! # Transfer Processor
//!
//! Moves stock between warehouses as two ledger legs sharing one transfer id.
//!
//! ```text
//!   debit(source, TRANSFER_OUT) ──fail──► error returned, nothing written
//!            │ ok
//!            ▼
//!   credit(dest, TRANSFER_IN)   ──ok────► TransferReceipt
//!            │ fail
//!            ▼
//!   credit(source, TRANSFER_IN, ref TRANSFER_COMPENSATION)
//!            ├── ok   ► TransferPartialFailure { compensated: true }
//!            └── fail ► incident + TransferPartialFailure { compensated: false }
//! ```
//!
//! The legs are separate transactions on a [`StockLedger`], so source and
//! destination need not share a store.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::StockLedger;
use crate::repository::{IncidentKind, IncidentRepository};
use depot_core::validation::validate_transfer;
use depot_core::{
    CreditKind, DebitKind, Reference, ReferenceType, StockError, StockMovement, StockResult,
    TransferLeg, TransferReceipt, TransferRequest,
};

pub struct TransferProcessor<L: StockLedger> {
    ledger: L,
    incidents: IncidentRepository,
}

impl<L: StockLedger> TransferProcessor<L> {
    pub fn new(ledger: L, incidents: IncidentRepository) -> Self {
        TransferProcessor { ledger, incidents }
    }

    /// Runs both legs of a transfer.
    ///
    /// ## Returns
    /// * `Ok(TransferReceipt)` - both legs recorded
    /// * `Err(InsufficientStock | NotFound | ...)` - debit leg failed, no change
    /// * `Err(TransferPartialFailure)` - credit leg failed; see `compensated`
    pub async fn transfer(&self, request: &TransferRequest) -> StockResult<TransferReceipt> {
        validate_transfer(
            &request.product_id,
            &request.source_warehouse_id,
            &request.dest_warehouse_id,
            request.quantity,
            &request.actor_id,
        )?;

        let transfer_id = Uuid::new_v4().to_string();

        let outbound = self
            .ledger
            .debit(
                &self.movement(request, &request.source_warehouse_id, &transfer_id),
                DebitKind::TransferOut,
            )
            .await?;

        let inbound = match self
            .ledger
            .credit(
                &self.movement(request, &request.dest_warehouse_id, &transfer_id),
                CreditKind::TransferIn,
            )
            .await
        {
            Ok(entry) => entry,
            Err(cause) => return Err(self.compensate(request, &transfer_id, cause).await),
        };

        info!(
            transfer_id = %transfer_id,
            product_id = %request.product_id,
            from = %request.source_warehouse_id,
            to = %request.dest_warehouse_id,
            quantity = request.quantity,
            "Transfer completed"
        );

        Ok(TransferReceipt {
            transfer_id,
            outbound,
            inbound,
        })
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn movement(
        &self,
        request: &TransferRequest,
        warehouse_id: &str,
        transfer_id: &str,
    ) -> StockMovement {
        let movement = StockMovement::new(
            &request.product_id,
            warehouse_id,
            request.quantity,
            &request.actor_id,
        )
        .with_reference(Reference::transfer(transfer_id));

        match &request.notes {
            Some(notes) => movement.with_notes(notes.clone()),
            None => movement,
        }
    }

    /// Credits the source back after a failed credit leg.
    async fn compensate(
        &self,
        request: &TransferRequest,
        transfer_id: &str,
        cause: StockError,
    ) -> StockError {
        warn!(
            transfer_id,
            product_id = %request.product_id,
            to = %request.dest_warehouse_id,
            error = %cause,
            "Transfer credit leg failed, compensating source"
        );

        let restore = StockMovement::new(
            &request.product_id,
            &request.source_warehouse_id,
            request.quantity,
            &request.actor_id,
        )
        .with_reference(Reference::new(ReferenceType::TransferCompensation, transfer_id))
        .with_notes(format!("compensation for transfer {transfer_id}"));

        let compensation = self.ledger.credit(&restore, CreditKind::TransferIn).await;

        let compensated = match compensation {
            Ok(_) => {
                warn!(transfer_id, "Transfer compensated, source restored");
                true
            }
            Err(compensation_error) => {
                error!(
                    transfer_id,
                    product_id = %request.product_id,
                    from = %request.source_warehouse_id,
                    quantity = request.quantity,
                    error = %compensation_error,
                    "Transfer compensation failed, stock is in transit"
                );

                let details = serde_json::json!({
                    "transfer_id": transfer_id,
                    "dest_warehouse_id": request.dest_warehouse_id,
                    "quantity": request.quantity,
                    "credit_error": cause.to_string(),
                    "compensation_error": compensation_error.to_string(),
                });
                if let Err(record_error) = self
                    .incidents
                    .record(
                        IncidentKind::CompensationFailed,
                        &request.product_id,
                        &request.source_warehouse_id,
                        Some(transfer_id),
                        &details,
                    )
                    .await
                {
                    error!(transfer_id, error = %record_error, "Failed to record incident");
                }
                false
            }
        };

        StockError::TransferPartialFailure {
            transfer_id: transfer_id.to_string(),
            leg: TransferLeg::Credit,
            compensated,
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StockLedgerEngine;
    use crate::test_support::{setup, stock, A, B, X};
    use async_trait::async_trait;
    use depot_core::{LedgerEntry, LedgerEntryType};

    fn request(from: &str, to: &str, quantity: i64) -> TransferRequest {
        TransferRequest {
            product_id: X.into(),
            source_warehouse_id: from.into(),
            dest_warehouse_id: to.into(),
            quantity,
            actor_id: "stocker".into(),
            notes: None,
        }
    }

    /// Delegates debits; every credit fails.
    struct CreditsFail(StockLedgerEngine);

    #[async_trait]
    impl StockLedger for CreditsFail {
        async fn debit(&self, movement: &StockMovement, kind: DebitKind) -> StockResult<LedgerEntry> {
            self.0.debit(movement, kind).await
        }

        async fn credit(&self, _: &StockMovement, _: CreditKind) -> StockResult<LedgerEntry> {
            Err(StockError::Storage("disk I/O error".into()))
        }

        async fn quantity(&self, product_id: &str, warehouse_id: &str) -> StockResult<i64> {
            self.0.get_quantity(product_id, warehouse_id).await
        }
    }

    #[tokio::test]
    async fn test_transfer_moves_stock_under_one_id() {
        let db = setup().await;
        stock(&db, X, A, 30).await;

        let receipt = db.transfers().transfer(&request(A, B, 10)).await.unwrap();

        let engine = db.engine();
        assert_eq!(engine.get_quantity(X, A).await.unwrap(), 20);
        assert_eq!(engine.get_quantity(X, B).await.unwrap(), 10);

        assert_eq!(receipt.outbound.entry_type, LedgerEntryType::TransferOut);
        assert_eq!(receipt.outbound.delta, -10);
        assert_eq!(receipt.inbound.entry_type, LedgerEntryType::TransferIn);
        assert_eq!(receipt.inbound.delta, 10);

        let legs = db.ledger().by_reference(&receipt.transfer_id).await.unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs
            .iter()
            .all(|e| e.reference_type == Some(ReferenceType::Transfer)));
    }

    #[tokio::test]
    async fn test_failed_debit_leaves_both_sides_untouched() {
        let db = setup().await;
        stock(&db, X, A, 5).await;

        let err = db.transfers().transfer(&request(A, B, 8)).await.unwrap_err();

        assert!(matches!(err, StockError::InsufficientStock { available: 5, .. }));
        assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 5);
        assert!(db.engine().get_quantity(X, B).await.is_err());
    }

    #[tokio::test]
    async fn test_same_warehouse_rejected() {
        let db = setup().await;

        let err = db.transfers().transfer(&request(A, A, 1)).await.unwrap_err();

        assert!(matches!(err, StockError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_inactive_destination_is_compensated() {
        let db = setup().await;
        stock(&db, X, A, 30).await;
        db.catalog().set_warehouse_active(B, false).await.unwrap();

        let err = db.transfers().transfer(&request(A, B, 10)).await.unwrap_err();

        let StockError::TransferPartialFailure {
            transfer_id,
            leg,
            compensated,
            ..
        } = err
        else {
            panic!("expected partial failure, got {err:?}");
        };
        assert_eq!(leg, TransferLeg::Credit);
        assert!(compensated);

        assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 30);
        assert!(db.engine().get_quantity(X, B).await.is_err());

        let entries = db.ledger().by_reference(&transfer_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, LedgerEntryType::TransferOut);
        assert_eq!(entries[1].entry_type, LedgerEntryType::TransferIn);
        assert_eq!(
            entries[1].reference_type,
            Some(ReferenceType::TransferCompensation)
        );
        assert!(db.engine().reconcile(X, A).await.unwrap().is_consistent());
        assert!(db.incidents().list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_compensation_records_incident() {
        let db = setup().await;
        stock(&db, X, A, 30).await;
        let transfers = TransferProcessor::new(CreditsFail(db.engine()), db.incidents());

        let err = transfers.transfer(&request(A, B, 10)).await.unwrap_err();

        assert!(matches!(
            err,
            StockError::TransferPartialFailure {
                compensated: false,
                leg: TransferLeg::Credit,
                ..
            }
        ));
        assert_eq!(transfers.ledger().quantity(X, A).await.unwrap(), 20);

        let incidents = db.incidents().list_open().await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, IncidentKind::CompensationFailed);
        assert_eq!(incidents[0].product_id, X);
        assert_eq!(incidents[0].warehouse_id, A);
    }
}
