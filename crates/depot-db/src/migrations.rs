//! # Database Migrations
//!
//! Embedded SQL migrations for the Depot schema.
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `crates/depot-db/migrations/` with the next sequence number
//! 2. Name format: `NNN_description.sql` (e.g., `002_add_lot_numbers.sql`)
//! 3. **NEVER** modify existing migrations - always add new ones
//! 4. Never drop the append-only triggers on `ledger_entries`

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the crate's `migrations` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Runs all pending database migrations.
///
/// Idempotent; applied migrations are tracked in `_sqlx_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)`.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
