//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use tally_core::{CoreError, Customer, ItemRequest, Ledger, Money, NewOrder, OrderAggregate, Product};
use tally_db::{Database, DbConfig, DbError};

/// One customer and one product (price 5.00, stock 10) on a fresh
/// in-memory database.
pub struct Fixture {
    pub db: Database,
    pub customer: Customer,
    pub widget: Product,
}

pub async fn fixture() -> Fixture {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(db).await
}

pub async fn seed(db: Database) -> Fixture {
    let customer = db.customers().create("Ada").await.unwrap();
    let widget = db
        .products()
        .insert("WIDGET", "Widget", Money::from_cents(500), 10)
        .await
        .unwrap();
    Fixture { db, customer, widget }
}

impl Fixture {
    pub async fn add_product(&self, sku: &str, price_cents: i64, stock: i64) -> Product {
        self.db
            .products()
            .insert(sku, sku, Money::from_cents(price_cents), stock)
            .await
            .unwrap()
    }

    /// Creates an order and returns it as stored.
    pub async fn order(&self, items: Vec<ItemRequest>) -> OrderAggregate {
        let created = self
            .db
            .engine()
            .create_order(NewOrder {
                customer_id: self.customer.id.clone(),
                items,
                supplement: Money::zero(),
            })
            .await
            .unwrap();
        self.db.orders().get(&created.order.id).await.unwrap()
    }

    pub async fn stock(&self, product_id: &str) -> i64 {
        self.db
            .products()
            .get_by_id(product_id)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    pub async fn ledger(&self) -> Ledger {
        self.db.ledgers().get(&self.customer.id).await.unwrap()
    }
}

/// The business error inside a DbError.
pub fn domain(err: &DbError) -> &CoreError {
    match err.as_domain() {
        Some(core) => core,
        None => panic!("expected a domain error, got {err:?}"),
    }
}

pub fn cents(value: i64) -> Money {
    Money::from_cents(value)
}

/// A database file path that no other test uses.
pub fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("tally-test-{}.db", uuid::Uuid::new_v4()))
}

/// Removes a database file and its WAL companions.
pub fn remove_db_files(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = path.clone().into_os_string();
        name.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(name));
    }
}
