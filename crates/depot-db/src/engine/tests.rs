use super::*;
use crate::pool::{Database, DbConfig};
use crate::repository::NewProduct;
use crate::test_support::{setup, stock, A, B, X, Y};
use chrono::Duration as ChronoDuration;
use depot_core::Reference;

fn movement(product_id: &str, warehouse_id: &str, quantity: i64) -> StockMovement {
    StockMovement::new(product_id, warehouse_id, quantity, "clerk-1")
}

#[tokio::test]
async fn test_debit_decrements_and_records_export() {
    let db = setup().await;
    let engine = db.engine();
    engine
        .credit(&movement(X, A, 10), CreditKind::Import)
        .await
        .unwrap();

    let entry = engine
        .debit(&movement(X, A, 4), DebitKind::Export)
        .await
        .unwrap();

    assert_eq!(entry.entry_type, LedgerEntryType::Export);
    assert_eq!(entry.delta, -4);
    assert_eq!(entry.balance_after, 6);
    assert_eq!(entry.actor_id, "clerk-1");
    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 6);

    let record = engine.get_record(X, A).await.unwrap();
    assert_eq!(record.version, 2);
}

#[tokio::test]
async fn test_debit_beyond_stock_reports_available() {
    let db = setup().await;
    let engine = db.engine();
    engine
        .credit(&movement(X, A, 6), CreditKind::Import)
        .await
        .unwrap();

    let err = engine
        .debit(&movement(X, A, 7), DebitKind::Export)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StockError::InsufficientStock {
            available: 6,
            requested: 7,
            ..
        }
    ));
    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 6);
    assert_eq!(engine.history(X, A, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_credit_creates_record_on_first_movement() {
    let db = setup().await;
    let engine = db.engine();

    let entry = engine
        .credit(&movement(Y, B, 12), CreditKind::Import)
        .await
        .unwrap();

    assert_eq!(entry.entry_type, LedgerEntryType::Import);
    assert_eq!(entry.delta, 12);
    assert_eq!(entry.balance_after, 12);

    let record = engine.get_record(Y, B).await.unwrap();
    assert_eq!(record.quantity, 12);
    assert_eq!(record.reserved_quantity, 0);
    assert_eq!(record.min_stock, None);
}

#[tokio::test]
async fn test_references_and_notes_are_recorded() {
    let db = setup().await;
    let engine = db.engine();

    let entry = engine
        .credit(
            &movement(X, A, 3)
                .with_reference(Reference::transfer("t-1"))
                .with_notes("from supplier"),
            CreditKind::TransferIn,
        )
        .await
        .unwrap();

    let stored = &db.ledger().by_reference("t-1").await.unwrap()[0];
    assert_eq!(stored.id, entry.id);
    assert_eq!(stored.reference(), Some(Reference::transfer("t-1")));
    assert_eq!(stored.notes.as_deref(), Some("from supplier"));
}

#[tokio::test]
async fn test_missing_entities_are_not_found() {
    let db = setup().await;
    let engine = db.engine();

    let err = engine
        .debit(&movement(X, A, 1), DebitKind::Export)
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "StockRecord"));

    let err = engine
        .credit(&movement("ghost", A, 1), CreditKind::Import)
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "Product"));

    let err = engine
        .credit(&movement(X, "nowhere", 1), CreditKind::Import)
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "Warehouse"));

    let err = engine.get_quantity(Y, A).await.unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "StockRecord"));

    assert_eq!(db.ledger().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_inactive_product_blocks_movements() {
    let db = setup().await;
    let engine = db.engine();
    stock(&db, X, A, 10).await;
    db.catalog().set_product_active(X, false).await.unwrap();

    let err = engine
        .debit(&movement(X, A, 1), DebitKind::Export)
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "Product"));

    let err = engine
        .credit(&movement(X, A, 1), CreditKind::Import)
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "Product"));

    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 10);
}

#[tokio::test]
async fn test_invalid_quantities_rejected() {
    let db = setup().await;
    let engine = db.engine();

    for quantity in [0, -5] {
        let err = engine
            .credit(&movement(X, A, quantity), CreditKind::Import)
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidInput(_)));
    }

    let err = engine
        .debit(&movement("", A, 1), DebitKind::Export)
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::InvalidInput(_)));
}

#[tokio::test]
async fn test_oversized_quantities_rejected_before_writing() {
    let db = setup().await;
    let engine = db.engine();
    stock(&db, X, A, 10).await;

    let err = engine
        .credit(&movement(X, A, i64::MAX), CreditKind::Import)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StockError::InvalidInput(ValidationError::OutOfRange { .. })
    ));

    let err = engine
        .debit(&movement(X, A, i64::MAX), DebitKind::Export)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StockError::InvalidInput(ValidationError::OutOfRange { .. })
    ));

    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 10);
    assert!(engine.reconcile(X, A).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_history_newest_first() {
    let db = setup().await;
    let engine = db.engine();
    engine
        .credit(&movement(X, A, 10), CreditKind::Import)
        .await
        .unwrap();
    engine
        .debit(&movement(X, A, 2), DebitKind::Export)
        .await
        .unwrap();
    engine
        .debit(&movement(X, A, 3), DebitKind::TransferOut)
        .await
        .unwrap();

    let history = engine.history(X, A, 10).await.unwrap();
    let deltas: Vec<i64> = history.iter().map(|e| e.delta).collect();
    assert_eq!(deltas, vec![-3, -2, 10]);
    let balances: Vec<i64> = history.iter().map(|e| e.balance_after).collect();
    assert_eq!(balances, vec![5, 8, 10]);

    assert_eq!(engine.history(X, A, 1).await.unwrap().len(), 1);

    let since = Utc::now() - ChronoDuration::hours(1);
    let exports = engine
        .entries_by_type(LedgerEntryType::Export, since, 10)
        .await
        .unwrap();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].delta, -2);
}

#[tokio::test]
async fn test_ledger_is_append_only() {
    let db = setup().await;
    stock(&db, X, A, 10).await;

    let update = sqlx::query("UPDATE ledger_entries SET delta = 99")
        .execute(db.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM ledger_entries")
        .execute(db.pool())
        .await;
    assert!(delete.is_err());

    let delete = sqlx::query("DELETE FROM stock_records")
        .execute(db.pool())
        .await;
    assert!(delete.is_err());

    assert_eq!(db.ledger().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reconcile_detects_drift() {
    let db = setup().await;
    let engine = db.engine();
    stock(&db, X, A, 10).await;
    stock(&db, Y, A, 4).await;
    engine
        .debit(&movement(X, A, 3), DebitKind::Export)
        .await
        .unwrap();

    let report = engine.reconcile(X, A).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.stored_quantity, 7);
    assert_eq!(report.ledger_sum, 7);
    assert!(report.ensure_consistent().is_ok());

    // Out-of-band write that bypasses the ledger.
    sqlx::query("UPDATE stock_records SET quantity = quantity + 2 WHERE product_id = ?")
        .bind(X)
        .execute(db.pool())
        .await
        .unwrap();

    let report = engine.reconcile(X, A).await.unwrap();
    assert_eq!(report.drift, 2);
    assert!(matches!(
        report.ensure_consistent(),
        Err(StockError::LedgerDrift {
            stored: 9,
            ledger_sum: 7,
            ..
        })
    ));

    let reports = engine.reconcile_all().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports.iter().filter(|r| !r.is_consistent()).count(), 1);

    let incidents = db.incidents().list_open().await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].kind, IncidentKind::LedgerDrift);
    assert_eq!(incidents[0].product_id, X);

    let err = engine.reconcile(X, B).await.unwrap_err();
    assert!(matches!(err, StockError::NotFound { .. }));
}

#[tokio::test]
async fn test_repeated_audits_keep_one_open_drift_incident() {
    let db = setup().await;
    let engine = db.engine();
    stock(&db, X, A, 10).await;

    sqlx::query("UPDATE stock_records SET quantity = quantity - 1 WHERE product_id = ?")
        .bind(X)
        .execute(db.pool())
        .await
        .unwrap();

    engine.reconcile_all().await.unwrap();
    let reports = engine.reconcile_all().await.unwrap();
    assert_eq!(reports[0].drift, -1);

    let incidents = db.incidents();
    let open = incidents.list_open().await.unwrap();
    assert_eq!(open.len(), 1);

    // Once resolved, drift that is still there is reported afresh.
    incidents.resolve(&open[0].id).await.unwrap();
    engine.reconcile_all().await.unwrap();
    let reopened = incidents.list_open().await.unwrap();
    assert_eq!(reopened.len(), 1);
    assert_ne!(reopened[0].id, open[0].id);
}

#[tokio::test]
async fn test_thresholds_and_low_stock() {
    let db = setup().await;
    let engine = db.engine();
    stock(&db, X, A, 10).await;
    stock(&db, Y, A, 10).await;

    let record = engine
        .set_thresholds(X, A, Some(5), Some(50))
        .await
        .unwrap();
    assert_eq!(record.min_stock, Some(5));
    assert_eq!(record.max_stock, Some(50));
    assert!(engine.low_stock(A).await.unwrap().is_empty());

    engine
        .debit(&movement(X, A, 7), DebitKind::Export)
        .await
        .unwrap();
    let low = engine.low_stock(A).await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].product_id, X);
    assert!(low[0].is_below_minimum());

    let err = engine
        .set_thresholds(X, A, Some(10), Some(5))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::InvalidInput(_)));

    let err = engine.set_thresholds(X, B, Some(1), None).await.unwrap_err();
    assert!(matches!(err, StockError::NotFound { .. }));

    // Thresholds never touch the ledger.
    assert_eq!(engine.history(X, A, 10).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_debits_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("depot.db")).max_connections(4))
        .await
        .unwrap();
    db.catalog().insert_warehouse(A, "WH-A", "Main Store").await.unwrap();
    db.catalog()
        .insert_product(&NewProduct::new("SKU-X", "Widget", 1000).with_id(X))
        .await
        .unwrap();

    let engine = db.engine();
    engine
        .credit(&movement(X, A, 5), CreditKind::Import)
        .await
        .unwrap();

    let first = movement(X, A, 3);
    let second = movement(X, A, 3);
    let (left, right) = tokio::join!(
        engine.debit(&first, DebitKind::Export),
        engine.debit(&second, DebitKind::Export),
    );

    let outcomes = [left, right];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(StockError::InsufficientStock { available: 2, .. })
    )));

    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 2);
    assert!(engine.reconcile(X, A).await.unwrap().is_consistent());

    db.close().await;
}
