use super::*;
use crate::test_support::{setup, setup_file, stock, A, B, X, Y};
use depot_core::{LedgerEntryType, ShiftStatus};

fn sale(lines: Vec<SaleLine>) -> SaleRequest {
    SaleRequest {
        warehouse_id: A.into(),
        actor_id: "cashier-1".into(),
        customer_id: None,
        shift_id: None,
        lines,
        amount_paid_cents: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_sale_debits_every_line_and_prices_invoice() {
    let db = setup().await;
    stock(&db, X, A, 10).await;
    stock(&db, Y, A, 10).await;

    let detail = db
        .sales()
        .process(&sale(vec![SaleLine::new(X, 2, 1000), SaleLine::new(Y, 2, 250)]))
        .await
        .unwrap();

    // X: 2 × 10.00, no tax. Y: 2 × 2.50 + 10% catalog tax.
    let invoice = &detail.invoice;
    assert_eq!(invoice.subtotal_cents, 2500);
    assert_eq!(invoice.tax_cents, 50);
    assert_eq!(invoice.total_cents, 2550);
    assert_eq!(invoice.amount_paid_cents, 2550);
    assert_eq!(invoice.status, InvoiceStatus::Paid);

    assert_eq!(detail.items.len(), 2);
    assert_eq!(detail.items[0].sku_snapshot, "SKU-X");
    assert_eq!(detail.items[0].cost_cents, Some(600));
    assert_eq!(detail.items[1].tax_rate_bps, 1000);

    let engine = db.engine();
    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 8);
    assert_eq!(engine.get_quantity(Y, A).await.unwrap(), 8);

    let entries = db.ledger().by_reference(&invoice.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.entry_type == LedgerEntryType::Export
        && e.reference_type == Some(ReferenceType::Invoice)
        && e.delta == -2));

    let stored = db.sales().get(&invoice.id).await.unwrap();
    assert_eq!(stored.invoice.total_cents, 2550);
    assert_eq!(stored.items, detail.items);
}

#[tokio::test]
async fn test_one_short_line_rejects_whole_sale() {
    let db = setup().await;
    stock(&db, X, A, 10).await;
    stock(&db, Y, A, 1).await;
    let entries_before = db.ledger().count().await.unwrap();

    let err = db
        .sales()
        .process(&sale(vec![SaleLine::new(X, 4, 1000), SaleLine::new(Y, 3, 250)]))
        .await
        .unwrap_err();

    let StockError::SaleRejected { failures } = err else {
        panic!("expected SaleRejected, got {err:?}");
    };
    assert_eq!(
        failures,
        vec![LineFailure {
            line_index: 1,
            product_id: Y.into(),
            requested: 3,
            reason: LineFailureReason::InsufficientStock { available: 1 },
        }]
    );

    assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 10);
    assert_eq!(db.engine().get_quantity(Y, A).await.unwrap(), 1);
    assert_eq!(db.ledger().count().await.unwrap(), entries_before);
    assert_eq!(db.invoices().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_repeated_product_lines_share_stock() {
    let db = setup().await;
    stock(&db, X, A, 5).await;

    let err = db
        .sales()
        .process(&sale(vec![SaleLine::new(X, 3, 1000), SaleLine::new(X, 3, 1000)]))
        .await
        .unwrap_err();

    let StockError::SaleRejected { failures } = err else {
        panic!("expected SaleRejected, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].line_index, 1);
    assert_eq!(
        failures[0].reason,
        LineFailureReason::InsufficientStock { available: 2 }
    );
    assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 5);
}

#[tokio::test]
async fn test_unknown_product_and_missing_record_reported_per_line() {
    let db = setup().await;
    stock(&db, X, A, 5).await;

    let err = db
        .sales()
        .process(&sale(vec![SaleLine::new(X, 1, 1000), SaleLine::new("ghost", 1, 100)]))
        .await
        .unwrap_err();
    let StockError::SaleRejected { failures } = err else {
        panic!("expected SaleRejected, got {err:?}");
    };
    assert_eq!(failures[0].line_index, 1);
    assert_eq!(
        failures[0].reason,
        LineFailureReason::NotFound {
            entity: "Product".into()
        }
    );

    // Y is in the catalog but has never been stocked at A.
    let err = db
        .sales()
        .process(&sale(vec![SaleLine::new(X, 1, 1000), SaleLine::new(Y, 1, 250)]))
        .await
        .unwrap_err();
    let StockError::SaleRejected { failures } = err else {
        panic!("expected SaleRejected, got {err:?}");
    };
    assert_eq!(
        failures[0].reason,
        LineFailureReason::NotFound {
            entity: "StockRecord".into()
        }
    );

    assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 5);
}

#[tokio::test]
async fn test_invalid_requests_write_nothing() {
    let db = setup().await;
    stock(&db, X, A, 5).await;
    let sales = db.sales();

    let err = sales.process(&sale(vec![])).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidInput(_)));

    let err = sales
        .process(&sale(vec![SaleLine::new(X, 0, 1000)]))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::InvalidInput(_)));

    let err = sales
        .process(&SaleRequest {
            warehouse_id: "nowhere".into(),
            ..sale(vec![SaleLine::new(X, 1, 1000)])
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "Warehouse"));

    assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 5);
    assert_eq!(db.invoices().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_amount_overflow_rejected_as_invalid_input() {
    let db = setup().await;
    stock(&db, X, A, 10).await;
    let sales = db.sales();

    let err = sales
        .process(&sale(vec![SaleLine::new(X, 3, i64::MAX / 2)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StockError::InvalidInput(ValidationError::OutOfRange { ref field, .. })
            if field == "lines[0].unit_price"
    ));

    let err = sales
        .process(&sale(vec![
            SaleLine::new(X, 1, i64::MAX / 2 + 1),
            SaleLine::new(X, 1, i64::MAX / 2 + 1),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::InvalidInput(_)));

    assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 10);
    assert_eq!(db.invoices().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_partial_payment_queues_receivable() {
    let db = setup().await;
    stock(&db, X, A, 5).await;

    let detail = db
        .sales()
        .process(&SaleRequest {
            customer_id: Some("cust-9".into()),
            amount_paid_cents: Some(1200),
            ..sale(vec![SaleLine::new(X, 2, 1000)])
        })
        .await
        .unwrap();

    assert_eq!(detail.invoice.status, InvoiceStatus::Pending);
    assert_eq!(detail.invoice.balance_due().cents(), 800);

    let events = db.outbox().for_aggregate(&detail.invoice.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ReceivableEvent::EVENT_TYPE);
    let event: ReceivableEvent = events[0].decode().unwrap();
    assert_eq!(event.customer_id, "cust-9");
    assert_eq!(event.delta_cents, 800);
}

#[tokio::test]
async fn test_partial_payment_requires_customer() {
    let db = setup().await;
    stock(&db, X, A, 5).await;

    let err = db
        .sales()
        .process(&SaleRequest {
            amount_paid_cents: Some(500),
            ..sale(vec![SaleLine::new(X, 1, 1000)])
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StockError::InvalidInput(_)));
    assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 5);
}

#[tokio::test]
async fn test_sale_updates_open_shift_in_same_transaction() {
    let db = setup().await;
    stock(&db, X, A, 5).await;
    let register = db.shift_register();
    let shift = register
        .start(A, "cashier-1", Money::from_cents(5000), None)
        .await
        .unwrap();

    let detail = db
        .sales()
        .process(&SaleRequest {
            shift_id: Some(shift.id.clone()),
            customer_id: Some("cust-1".into()),
            amount_paid_cents: Some(1500),
            ..sale(vec![SaleLine::new(X, 2, 1000)])
        })
        .await
        .unwrap();

    // Only cash collected counts toward the drawer.
    let shift = register.get(&shift.id).await.unwrap();
    assert_eq!(shift.total_sales_cents, 1500);
    assert_eq!(shift.transaction_count, 1);
    assert_eq!(
        db.invoices().list_by_shift(&shift.id).await.unwrap()[0].id,
        detail.invoice.id
    );

    let closed = register
        .end(&shift.id, Money::from_cents(6500), None)
        .await
        .unwrap();
    assert_eq!(closed.status, ShiftStatus::Closed);
    assert_eq!(closed.variance_cents, Some(0));
}

#[tokio::test]
async fn test_closed_or_foreign_shift_rejected() {
    let db = setup().await;
    stock(&db, X, A, 5).await;
    let register = db.shift_register();

    let closed = register.start(A, "cashier-1", Money::zero(), None).await.unwrap();
    register.end(&closed.id, Money::zero(), None).await.unwrap();
    let err = db
        .sales()
        .process(&SaleRequest {
            shift_id: Some(closed.id.clone()),
            ..sale(vec![SaleLine::new(X, 1, 1000)])
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NoOpenShift { .. }));

    let elsewhere = register.start(B, "cashier-1", Money::zero(), None).await.unwrap();
    let err = db
        .sales()
        .process(&SaleRequest {
            shift_id: Some(elsewhere.id),
            ..sale(vec![SaleLine::new(X, 1, 1000)])
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::InvalidInput(_)));

    assert_eq!(db.engine().get_quantity(X, A).await.unwrap(), 5);
}

#[tokio::test]
async fn test_cancel_credits_stock_back() {
    let db = setup().await;
    stock(&db, X, A, 10).await;
    stock(&db, Y, A, 10).await;
    let sales = db.sales();

    let detail = sales
        .process(&sale(vec![SaleLine::new(X, 3, 1000), SaleLine::new(Y, 1, 250)]))
        .await
        .unwrap();

    let canceled = sales.cancel(&detail.invoice.id, "manager-1").await.unwrap();
    assert_eq!(canceled.status, InvoiceStatus::Canceled);

    let engine = db.engine();
    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 10);
    assert_eq!(engine.get_quantity(Y, A).await.unwrap(), 10);

    let reversals = db
        .ledger()
        .by_reference_kind(ReferenceType::InvoiceCancel, &detail.invoice.id)
        .await
        .unwrap();
    assert_eq!(reversals.len(), 2);
    assert!(reversals
        .iter()
        .all(|e| e.entry_type == LedgerEntryType::Import && e.actor_id == "manager-1"));

    assert!(engine.reconcile(X, A).await.unwrap().is_consistent());

    let err = sales.cancel(&detail.invoice.id, "manager-1").await.unwrap_err();
    assert!(matches!(err, StockError::InvalidInput(_)));

    let err = sales.cancel("missing", "manager-1").await.unwrap_err();
    assert!(matches!(err, StockError::NotFound { ref entity, .. } if entity == "Invoice"));
}

#[tokio::test]
async fn test_cancel_partially_paid_reverses_receivable() {
    let db = setup().await;
    stock(&db, X, A, 5).await;

    let detail = db
        .sales()
        .process(&SaleRequest {
            customer_id: Some("cust-9".into()),
            amount_paid_cents: Some(0),
            ..sale(vec![SaleLine::new(X, 1, 1000)])
        })
        .await
        .unwrap();
    db.sales().cancel(&detail.invoice.id, "manager-1").await.unwrap();

    let events = db.outbox().for_aggregate(&detail.invoice.id).await.unwrap();
    let deltas: Vec<i64> = events
        .iter()
        .map(|e| e.decode::<ReceivableEvent>().unwrap().delta_cents)
        .collect();
    assert_eq!(deltas, vec![1000, -1000]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_sales_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let db = setup_file(dir.path()).await;
    stock(&db, X, A, 5).await;
    stock(&db, Y, A, 5).await;

    let first = sale(vec![SaleLine::new(X, 3, 1000), SaleLine::new(Y, 3, 250)]);
    let second = sale(vec![SaleLine::new(X, 3, 1000), SaleLine::new(Y, 3, 250)]);
    let sales = db.sales();
    let (left, right) = tokio::join!(sales.process(&first), sales.process(&second));

    let outcomes = [left, right];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let failures = outcomes
        .iter()
        .find_map(|r| match r {
            Err(StockError::SaleRejected { failures }) => Some(failures.clone()),
            _ => None,
        })
        .unwrap();
    assert!(!failures.is_empty());
    assert!(failures.iter().all(|f| matches!(
        f.reason,
        LineFailureReason::InsufficientStock { available: 2 }
    )));

    // The losing sale left no partial debit behind.
    let engine = db.engine();
    assert_eq!(engine.get_quantity(X, A).await.unwrap(), 2);
    assert_eq!(engine.get_quantity(Y, A).await.unwrap(), 2);
    assert!(engine.reconcile(X, A).await.unwrap().is_consistent());
    assert!(engine.reconcile(Y, A).await.unwrap().is_consistent());
    assert_eq!(db.invoices().count().await.unwrap(), 1);
    assert_eq!(db.ledger().count().await.unwrap(), 4);

    db.close().await;
}
