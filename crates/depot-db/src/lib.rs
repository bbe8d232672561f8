//! # depot-db: Stock Ledger Storage and Processors
//!
//! SQLite-backed stock records, the append-only ledger, and the business
//! processors (sales, adjustments, transfers, shifts) built on top of them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Depot Data Flow                                │
//! │                                                                         │
//! │  Caller (POS terminal, back office; already authorized)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     depot-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌──────────────────┐   ┌──────────────┐  │   │
//! │  │   │  processor    │──►│     engine       │──►│  repository  │  │   │
//! │  │   │ sale/transfer │   │ debit / credit / │   │ stock ledger │  │   │
//! │  │   │ adjust/shift  │   │ adjust/reconcile │   │ invoice ...  │  │   │
//! │  │   └───────────────┘   └──────────────────┘   └──────┬───────┘  │   │
//! │  │                                                      │          │   │
//! │  │   ┌───────────────┐   ┌──────────────────┐          │          │   │
//! │  │   │   Database    │   │    Migrations    │          │          │   │
//! │  │   │   (pool.rs)   │   │    (embedded)    │          │          │   │
//! │  │   └───────────────┘   └──────────────────┘          │          │   │
//! │  └──────────────────────────────────────────────────────┼──────────┘   │
//! │                                                         ▼              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and the [`Database`] handle
//! - [`config`] - Environment configuration and the conflict retry policy
//! - [`migrations`] - Embedded schema migrations
//! - [`engine`] - Atomic debit/credit/adjust and reconciliation
//! - [`processor`] - Sale, adjustment, transfer and shift workflows
//! - [`repository`] - Table access
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use depot_db::{Database, DbConfig};
//! use depot_core::{SaleLine, SaleRequest};
//!
//! let db = Database::new(DbConfig::new("depot.db")).await?;
//!
//! let invoice = db
//!     .sales()
//!     .process(&SaleRequest {
//!         warehouse_id: "main".into(),
//!         actor_id: "cashier-7".into(),
//!         customer_id: None,
//!         shift_id: None,
//!         lines: vec![SaleLine::new("sku-cola", 2, 150)],
//!         amount_paid_cents: None,
//!         notes: None,
//!     })
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod processor;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LedgerConfig, RetryPolicy};
pub use engine::{StockLedger, StockLedgerEngine};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use processor::{AdjustmentProcessor, SaleProcessor, ShiftRegister, TransferProcessor};

// Repository re-exports for convenience
pub use repository::{
    CatalogRepository, Incident, IncidentKind, IncidentRepository, InvoiceRepository,
    LedgerRepository, NewProduct, OutboxEntry, OutboxRepository, ShiftRepository,
    StockRepository,
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::time::Duration;

    use crate::config::RetryPolicy;
    use crate::pool::{Database, DbConfig};
    use crate::repository::NewProduct;

    pub const A: &str = "wh-a";
    pub const B: &str = "wh-b";
    pub const X: &str = "prod-x";
    pub const Y: &str = "prod-y";

    /// In-memory database with warehouses A and B and products X and Y.
    ///
    /// X sells at 10.00 with no tax; Y sells at 2.50 with 10% tax.
    pub async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            });
        seed_catalog(&db).await;
        db
    }

    /// File-backed database with several connections, for contention tests.
    /// Same warehouses and products as [`setup`].
    pub async fn setup_file(dir: &Path) -> Database {
        let db = Database::new(DbConfig::new(dir.join("depot.db")).max_connections(4))
            .await
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 10,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(20),
            });
        seed_catalog(&db).await;
        db
    }

    async fn seed_catalog(db: &Database) {
        let catalog = db.catalog();
        catalog.insert_warehouse(A, "WH-A", "Main Store").await.unwrap();
        catalog.insert_warehouse(B, "WH-B", "Back Room").await.unwrap();
        catalog
            .insert_product(
                &NewProduct::new("SKU-X", "Widget", 1000)
                    .with_id(X)
                    .with_cost(600),
            )
            .await
            .unwrap();
        catalog
            .insert_product(
                &NewProduct::new("SKU-Y", "Gadget", 250)
                    .with_id(Y)
                    .with_tax_rate(1000),
            )
            .await
            .unwrap();
    }

    /// Opening stock through the adjustment processor.
    pub async fn stock(db: &Database, product_id: &str, warehouse_id: &str, quantity: i64) {
        db.adjustments()
            .initial_stock(product_id, warehouse_id, quantity, "setup")
            .await
            .unwrap();
    }
}
