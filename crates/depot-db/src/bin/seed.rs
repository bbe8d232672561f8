//! # Seed Data Generator
//!
//! Populates a ledger database with warehouses, products and opening stock
//! for development.
//!
//! ## Usage
//! ```bash
//! # 200 products (default) in ./depot.db, or $DEPOT_DB_PATH
//! cargo run -p depot-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p depot-db --bin seed -- --count 1000 --db ./data/depot.db
//! ```
//!
//! Every opening quantity is written as an INITIAL_STOCK adjustment, so a
//! seeded database reconciles cleanly.

use std::env;
use std::path::PathBuf;

use depot_db::{Database, LedgerConfig, NewProduct};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (id, code, name)
const WAREHOUSES: &[(&str, &str, &str)] = &[
    ("wh-main", "MAIN", "Main Store"),
    ("wh-back", "BACK", "Back Room"),
    ("wh-dc", "DC", "Distribution Center"),
];

/// Product families for realistic names.
const FAMILIES: &[(&str, &[&str])] = &[
    ("BEV", &["Cola", "Lemonade", "Iced Tea", "Sparkling Water", "Orange Juice"]),
    ("SNK", &["Potato Chips", "Pretzels", "Trail Mix", "Granola Bar", "Popcorn"]),
    ("DRY", &["Pasta", "Rice", "Lentils", "Oats", "Flour"]),
    ("HH", &["Dish Soap", "Paper Towels", "Sponges", "Trash Bags", "Detergent"]),
];

/// Tax rates in basis points
const TAX_RATES: &[u32] = &[0, 500, 825, 1000];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,depot_db=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = LedgerConfig::from_env()?;
    let mut count: usize = 200;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(count);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Depot Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: $DEPOT_DB_PATH or ./depot.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %config.database_path.display(), count, "Seeding ledger database");

    let db = Database::new(config.db_config())
        .await?
        .with_retry_policy(config.retry.clone());

    let catalog = db.catalog();
    if catalog.count_products().await? > 0 {
        warn!("Database already has products, skipping seed");
        return Ok(());
    }

    for (id, code, name) in WAREHOUSES {
        catalog.insert_warehouse(id, code, name).await?;
    }

    let adjustments = db.adjustments();
    let engine = db.engine();
    let start = std::time::Instant::now();
    let mut generated = 0;

    'outer: for (family_idx, (family, names)) in FAMILIES.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for variant in 0.. {
                if generated >= count {
                    break 'outer;
                }
                if variant * FAMILIES.len() * names.len() >= count {
                    break;
                }

                let seed = family_idx * 1000 + name_idx * 50 + variant;
                let product = generate_product(family, name, variant, seed);
                let product = catalog.insert_product(&product).await?;

                // Stock every product at MAIN; every third one at BACK too.
                let main_qty = 10 + (seed % 91) as i64;
                adjustments
                    .initial_stock(&product.id, "wh-main", main_qty, "seed")
                    .await?;
                engine
                    .set_thresholds(&product.id, "wh-main", Some(15), Some(200))
                    .await?;

                if seed % 3 == 0 {
                    adjustments
                        .initial_stock(&product.id, "wh-back", 24, "seed")
                        .await?;
                }

                generated += 1;
                if generated % 50 == 0 {
                    info!(generated, "Seeding products");
                }
            }
        }
    }

    let elapsed = start.elapsed();
    info!(generated, ?elapsed, "Products generated");

    let reports = engine.reconcile_all().await?;
    let drifted = reports.iter().filter(|r| !r.is_consistent()).count();
    let low = engine.low_stock("wh-main").await?.len();
    info!(records = reports.len(), drifted, low_stock = low, "Seed complete");

    db.close().await;
    Ok(())
}

/// One product with deterministic pseudo-random pricing.
fn generate_product(family: &str, name: &str, variant: usize, seed: usize) -> NewProduct {
    let sku = format!("{family}-{}-{seed:04}", &name.replace(' ', "")[..3].to_uppercase());
    let label = match variant {
        0 => name.to_string(),
        n => format!("{name} #{}", n + 1),
    };

    // 1.99 - 9.98
    let price_cents = 199 + ((seed * 17) % 800) as i64;
    // 60-79% of price
    let cost_cents = price_cents * (60 + (seed % 20) as i64) / 100;

    NewProduct::new(sku, label, price_cents)
        .with_cost(cost_cents)
        .with_tax_rate(TAX_RATES[seed % TAX_RATES.len()])
}
