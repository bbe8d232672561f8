//! # Reconciliation Incidents
//!
//! Durable record of integrity failures that need a human: ledger drift found
//! by an audit, and transfer compensations that could not be applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::error;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    /// Stored quantity differs from the ledger sum.
    LedgerDrift,
    /// A transfer's compensating credit failed; quantity is unaccounted for.
    CompensationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Incident {
    pub id: String,
    pub kind: IncidentKind,
    pub product_id: String,
    pub warehouse_id: String,
    /// Transfer id for compensation failures.
    pub reference_id: Option<String>,
    /// JSON with the figures needed for manual reconciliation.
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Repository for reconciliation incidents.
#[derive(Debug, Clone)]
pub struct IncidentRepository {
    pool: SqlitePool,
}

impl IncidentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        IncidentRepository { pool }
    }

    /// Records an incident. Always logged at error level.
    pub async fn record(
        &self,
        kind: IncidentKind,
        product_id: &str,
        warehouse_id: &str,
        reference_id: Option<&str>,
        details: &serde_json::Value,
    ) -> DbResult<Incident> {
        let incident = Incident {
            id: Uuid::new_v4().to_string(),
            kind,
            product_id: product_id.to_string(),
            warehouse_id: warehouse_id.to_string(),
            reference_id: reference_id.map(str::to_string),
            details: details.to_string(),
            created_at: Utc::now(),
            resolved_at: None,
        };

        error!(
            id = %incident.id,
            kind = ?kind,
            product_id,
            warehouse_id,
            reference_id = ?reference_id,
            details = %incident.details,
            "Reconciliation incident recorded"
        );

        sqlx::query(
            "INSERT INTO reconciliation_incidents (
                id, kind, product_id, warehouse_id, reference_id, details, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&incident.id)
        .bind(incident.kind)
        .bind(&incident.product_id)
        .bind(&incident.warehouse_id)
        .bind(&incident.reference_id)
        .bind(&incident.details)
        .bind(incident.created_at)
        .execute(&self.pool)
        .await?;

        Ok(incident)
    }

    /// Unresolved incidents, oldest first.
    pub async fn list_open(&self) -> DbResult<Vec<Incident>> {
        let incidents = sqlx::query_as::<_, Incident>(
            "SELECT id, kind, product_id, warehouse_id, reference_id, details, created_at, resolved_at
             FROM reconciliation_incidents
             WHERE resolved_at IS NULL
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(incidents)
    }

    /// The oldest unresolved incident of `kind` for a pair, if any.
    pub async fn find_open(
        &self,
        kind: IncidentKind,
        product_id: &str,
        warehouse_id: &str,
    ) -> DbResult<Option<Incident>> {
        let incident = sqlx::query_as::<_, Incident>(
            "SELECT id, kind, product_id, warehouse_id, reference_id, details, created_at, resolved_at
             FROM reconciliation_incidents
             WHERE kind = ? AND product_id = ? AND warehouse_id = ? AND resolved_at IS NULL
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(kind)
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(incident)
    }

    /// Marks an incident as handled.
    pub async fn resolve(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE reconciliation_incidents SET resolved_at = ?2 WHERE id = ?1 AND resolved_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Incident", id));
        }

        Ok(())
    }
}
