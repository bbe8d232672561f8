//! # Catalog Repository
//!
//! Products and warehouses as the ledger sees them.
//!
//! Catalog CRUD belongs to the surrounding application; this repository only
//! offers lookups for the processors plus the small write surface the seed
//! binary and tests need (register, activate, deactivate).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use depot_core::{ProductInfo, Warehouse};

const PRODUCT_COLUMNS: &str = "id, sku, name, cost_cents, price_cents, tax_rate_bps, is_active";
const WAREHOUSE_COLUMNS: &str = "id, code, name, is_active, created_at";

/// Product registration input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub cost_cents: Option<i64>,
    pub price_cents: i64,
    pub tax_rate_bps: u32,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price_cents: i64) -> Self {
        NewProduct {
            id: generate_id(),
            sku: sku.into(),
            name: name.into(),
            cost_cents: None,
            price_cents,
            tax_rate_bps: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_cost(mut self, cost_cents: i64) -> Self {
        self.cost_cents = Some(cost_cents);
        self
    }

    pub fn with_tax_rate(mut self, tax_rate_bps: u32) -> Self {
        self.tax_rate_bps = tax_rate_bps;
        self
    }
}

/// Repository for product and warehouse lookups.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Gets a product by its ID, active or not.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<ProductInfo>> {
        fetch_product(&self.pool, id).await
    }

    /// Gets a product by its SKU.
    pub async fn get_product_by_sku(&self, sku: &str) -> DbResult<Option<ProductInfo>> {
        let product = sqlx::query_as::<_, ProductInfo>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Registers a product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - id or SKU already exists
    pub async fn insert_product(&self, product: &NewProduct) -> DbResult<ProductInfo> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        let now = Utc::now();
        let inserted = sqlx::query_as::<_, ProductInfo>(&format!(
            "INSERT INTO products (
                id, sku, name, cost_cents, price_cents, tax_rate_bps, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
            RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.cost_cents)
        .bind(product.price_cents)
        .bind(product.tax_rate_bps)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    /// Activates or deactivates a product. Inactive products accept no movements.
    pub async fn set_product_active(&self, id: &str, active: bool) -> DbResult<()> {
        debug!(id, active, "Setting product active flag");

        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Warehouses
    // =========================================================================

    pub async fn get_warehouse(&self, id: &str) -> DbResult<Option<Warehouse>> {
        fetch_warehouse(&self.pool, id).await
    }

    /// All warehouses ordered by code.
    pub async fn list_warehouses(&self) -> DbResult<Vec<Warehouse>> {
        let warehouses = sqlx::query_as::<_, Warehouse>(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(warehouses)
    }

    /// Registers a warehouse.
    pub async fn insert_warehouse(
        &self,
        id: &str,
        code: &str,
        name: &str,
    ) -> DbResult<Warehouse> {
        debug!(id, code, "Inserting warehouse");

        let warehouse = sqlx::query_as::<_, Warehouse>(&format!(
            "INSERT INTO warehouses (id, code, name, is_active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             RETURNING {WAREHOUSE_COLUMNS}"
        ))
        .bind(id)
        .bind(code)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(warehouse)
    }

    /// Activates or deactivates a warehouse.
    pub async fn set_warehouse_active(&self, id: &str, active: bool) -> DbResult<()> {
        debug!(id, active, "Setting warehouse active flag");

        let result = sqlx::query("UPDATE warehouses SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Warehouse", id));
        }

        Ok(())
    }
}

pub(crate) async fn fetch_product<'e, E>(executor: E, id: &str) -> DbResult<Option<ProductInfo>>
where
    E: SqliteExecutor<'e>,
{
    let product = sqlx::query_as::<_, ProductInfo>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(product)
}

pub(crate) async fn fetch_warehouse<'e, E>(executor: E, id: &str) -> DbResult<Option<Warehouse>>
where
    E: SqliteExecutor<'e>,
{
    let warehouse = sqlx::query_as::<_, Warehouse>(&format!(
        "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(warehouse)
}

/// Generates a new entity ID.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
