//! # Ledger Audit
//!
//! Reconciles every stock record against its ledger and reports open
//! incidents. Exits with status 1 when drift is found or an incident is
//! unresolved, so it can run from cron or CI.
//!
//! ## Usage
//! ```bash
//! DEPOT_DB_PATH=./depot.db cargo run -p depot-db --bin audit
//! ```

use std::process::ExitCode;

use depot_db::{Database, LedgerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,depot_db=info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_tracing();

    let config = LedgerConfig::from_env()?;
    info!(path = %config.database_path.display(), "Auditing ledger");

    let db = Database::new(config.db_config())
        .await?
        .with_retry_policy(config.retry.clone());

    let reports = db.engine().reconcile_all().await?;
    let drifted: Vec<_> = reports.iter().filter(|r| !r.is_consistent()).collect();

    for report in &drifted {
        println!(
            "DRIFT  {} @ {}: stored {} ledger {} (drift {:+})",
            report.product_id,
            report.warehouse_id,
            report.stored_quantity,
            report.ledger_sum,
            report.drift
        );
    }

    let incidents = db.incidents().list_open().await?;
    for incident in &incidents {
        println!(
            "OPEN   {:?} {} @ {} ref={} {}",
            incident.kind,
            incident.product_id,
            incident.warehouse_id,
            incident.reference_id.as_deref().unwrap_or("-"),
            incident.details
        );
    }

    println!(
        "{} records checked, {} drifted, {} open incidents",
        reports.len(),
        drifted.len(),
        incidents.len()
    );

    db.close().await;

    if drifted.is_empty() && incidents.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            drifted = drifted.len(),
            open_incidents = incidents.len(),
            "Ledger audit failed"
        );
        Ok(ExitCode::FAILURE)
    }
}
