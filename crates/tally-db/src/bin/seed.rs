//! # Seed Data Generator
//!
//! Populates a database with a small catalog, a few customers, orders and
//! payments, then prints today's order summary.
//!
//! ## Usage
//! ```bash
//! # Seed the configured database (tally.toml / TALLY_DB_PATH / default)
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path and number of customers
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db --customers 20
//!
//! # More logging
//! RUST_LOG=debug cargo run -p tally-db --bin seed
//! ```

use std::env;
use std::path::PathBuf;

use tally_core::{ItemRequest, LedgerAccount, Money, NewOrder, OrderUpdate, Product};
use tally_db::{Database, TallyConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (sku, name, price in cents, opening stock)
const CATALOG: &[(&str, &str, i64, i64)] = &[
    ("BEV-COLA", "Cola 330ml", 150, 200),
    ("BEV-WATER", "Still Water 500ml", 90, 300),
    ("BEV-JUICE", "Orange Juice 1L", 325, 80),
    ("SNK-CHIPS", "Salted Chips", 199, 150),
    ("SNK-BAR", "Chocolate Bar", 120, 250),
    ("DRY-PASTA", "Penne 500g", 179, 120),
    ("DRY-RICE", "Basmati Rice 1kg", 349, 90),
    ("FRZ-PIZZA", "Frozen Pizza", 499, 40),
];

const CUSTOMER_NAMES: &[&str] = &[
    "Ada Lovelace",
    "Grace Hopper",
    "Alan Turing",
    "Barbara Liskov",
    "Edsger Dijkstra",
    "Margaret Hamilton",
    "Donald Knuth",
    "Frances Allen",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut customers: usize = 5;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--customers" | "-n" => {
                if i + 1 < args.len() {
                    customers = args[i + 1].parse().unwrap_or(5);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --customers <N>  Customers to create (default: 5)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = TallyConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }

    let db_config = config.db_config()?;
    if let Some(parent) = db_config.database_path.parent() {
        if !db_config.is_in_memory() && !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!(path = %db_config.database_path.display(), "Seeding database");

    let db = Database::new(db_config).await?;

    if !db.products().list().await?.is_empty() {
        warn!("Database already has products; skipping seed to avoid duplicates");
        return Ok(());
    }

    let mut products: Vec<Product> = Vec::with_capacity(CATALOG.len());
    for (sku, name, price_cents, stock) in CATALOG {
        let product = db
            .products()
            .insert(sku, name, Money::from_cents(*price_cents), *stock)
            .await?;
        products.push(product);
    }
    info!(count = products.len(), "Catalog created");

    let engine = db.engine();
    for n in 0..customers {
        let name = CUSTOMER_NAMES[n % CUSTOMER_NAMES.len()];
        let customer = db.customers().create(name).await?;

        let first = &products[n % products.len()];
        let second = &products[(n + 3) % products.len()];

        let order = engine
            .create_order(NewOrder {
                customer_id: customer.id.clone(),
                items: vec![
                    ItemRequest::new(first.id.clone(), 1 + (n as i64 % 3)),
                    ItemRequest::new(second.id.clone(), 2),
                ],
                supplement: Money::from_cents(if n % 2 == 0 { 0 } else { 250 }),
            })
            .await?;

        // Every other customer adds one more of the first item
        if n % 2 == 0 {
            let mut update = OrderUpdate::unchanged_from(&order);
            update.items[0].quantity += 1;
            engine.update_order(&order.order.id, update).await?;
        }

        let owed = engine.amount_to_pay(&customer.id).await?;
        let payment = Money::from_cents(owed.cents() / 2);
        if payment.is_positive() {
            engine
                .deposit(&customer.id, LedgerAccount::PaidAmount, payment, Some("seed payment"))
                .await?;
        }
    }
    info!(customers, "Customers, orders and payments created");

    let today = chrono::Utc::now().date_naive();
    let summary = db.orders().daily_summary(today).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    db.close().await;
    Ok(())
}

/// Installs the log subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
