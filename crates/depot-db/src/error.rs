//! # Database Error Types
//!
//! Error types for store operations and their mapping into [`StockError`].
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← categorized: busy, constraint, not found      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StockError (depot-core) ← what engine and processor callers see       │
//! │       Busy / PoolExhausted  → Conflict (retryable)                     │
//! │       NotFound              → NotFound                                 │
//! │       everything else       → Storage                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use depot_core::StockError;
use thiserror::Error;

/// Primary SQLite result codes we care about.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CONSTRAINT: i32 = 19;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - A second OPEN shift for the same warehouse and cashier
    /// - Duplicate warehouse code or product SKU
    #[error("Duplicate value violates {constraint}")]
    UniqueViolation { constraint: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint or trigger abort.
    ///
    /// ## When This Occurs
    /// - `quantity >= 0` on stock_records
    /// - UPDATE/DELETE against ledger_entries (append-only triggers)
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Another writer holds the database lock.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// JSON payload could not be encoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True for lock contention that a retry may get past.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Extracts the primary result code from an (extended) SQLite error code.
fn primary_code(db_err: &dyn sqlx::error::DatabaseError) -> Option<i32> {
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff)
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound       → DbError::NotFound
/// SQLITE_BUSY / SQLITE_LOCKED    → DbError::Busy
/// UNIQUE / FOREIGN KEY           → DbError::UniqueViolation / ForeignKeyViolation
/// other SQLITE_CONSTRAINT        → DbError::ConstraintViolation
/// sqlx::Error::PoolTimedOut      → DbError::PoolExhausted
/// Other                          → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();

                match primary_code(db_err.as_ref()) {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => return DbError::Busy(message),
                    _ if message.contains("database is locked") => {
                        return DbError::Busy(message)
                    }
                    _ => {}
                }

                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        constraint: message
                            .split("UNIQUE constraint failed: ")
                            .nth(1)
                            .unwrap_or("unknown")
                            .to_string(),
                    },
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        DbError::ForeignKeyViolation { message }
                    }
                    sqlx::error::ErrorKind::CheckViolation
                    | sqlx::error::ErrorKind::NotNullViolation => {
                        DbError::ConstraintViolation { message }
                    }
                    _ if primary_code(db_err.as_ref()) == Some(SQLITE_CONSTRAINT) => {
                        DbError::ConstraintViolation { message }
                    }
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Folds store failures into the ledger's error taxonomy.
///
/// Lock contention becomes a single-attempt [`StockError::Conflict`]; the
/// retry wrapper rewrites the attempt count when it gives up.
impl From<DbError> for StockError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StockError::NotFound { entity, id },
            DbError::Busy(_) | DbError::PoolExhausted => StockError::Conflict { attempts: 1 },
            other => StockError::Storage(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_retryable_conflict() {
        let err: StockError = DbError::Busy("database is locked".into()).into();
        assert!(matches!(err, StockError::Conflict { attempts: 1 }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_keeps_entity() {
        let err: StockError = DbError::not_found("Shift", "s-1").into();
        assert_eq!(err.to_string(), "Shift not found: s-1");
    }

    #[test]
    fn test_constraint_becomes_storage() {
        let err: StockError = DbError::ConstraintViolation {
            message: "ledger entries are append-only".into(),
        }
        .into();
        assert!(matches!(err, StockError::Storage(ref m) if m.contains("append-only")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_row_not_found_conversion() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(!err.is_busy());
    }
}
