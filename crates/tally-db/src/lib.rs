//! # tally-db: Storage and Reconciliation for Tally
//!
//! This crate owns every unit of work in Tally. It stores products,
//! customers, orders and ledgers in SQLite (via sqlx) and runs each order or
//! ledger mutation under keyed locks inside a single transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  Request layer (REST / RPC / CLI)                                      │
//! │       │  create_order / update_order / delete_order / deposit          │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ Reconciliation│    │  LockManager  │    │ Repositories │  │   │
//! │  │   │ Engine        │───►│  (locks.rs)   │    │ product      │  │   │
//! │  │   │ (engine.rs)   │    │ order<ledger< │    │ customer     │  │   │
//! │  │   │               │───►│ product       │    │ order        │  │   │
//! │  │   │ Inventory     │    └───────────────┘    │ ledger       │  │   │
//! │  │   │ Adjustor      │─────────────────────────►│              │  │   │
//! │  │   └───────────────┘                         └──────┬───────┘  │   │
//! │  │   Database (pool.rs) · TallyConfig (config.rs)     │          │   │
//! │  └─────────────────────────────────────────────────────┼──────────┘   │
//! │                                                        ▼              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/tally/tally.db (or :memory: in tests)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - TOML + environment configuration
//! - [`locks`] - Keyed exclusive locks with a global acquisition order
//! - [`engine`] - The ReconciliationEngine (all mutations of stock, orders, ledgers)
//! - [`inventory`] - The InventoryAdjustor, sole writer of product stock
//! - [`repository`] - Repository implementations
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::{ItemRequest, LedgerAccount, Money, NewOrder};
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::in_memory()).await?;
//! let customer = db.customers().create("Ada").await?;
//! let widget = db.products().insert("WIDGET", "Widget", Money::from_cents(500), 10).await?;
//!
//! let order = db.engine().create_order(NewOrder {
//!     customer_id: customer.id.clone(),
//!     items: vec![ItemRequest::new(widget.id.clone(), 3)],
//!     supplement: Money::zero(),
//! }).await?;
//! assert_eq!(order.total().to_string(), "15.00");
//!
//! db.engine().deposit(&customer.id, LedgerAccount::PaidAmount, order.amount_to_pay(), None).await?;
//! assert!(db.engine().amount_to_pay(&customer.id).await?.is_zero());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod locks;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::TallyConfig;
pub use engine::ReconciliationEngine;
pub use error::{DbError, DbResult};
pub use inventory::InventoryAdjustor;
pub use locks::{LockKey, LockManager, LockSet};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
