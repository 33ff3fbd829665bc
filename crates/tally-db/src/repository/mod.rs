//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Two Kinds of Method
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pool methods (&self)              Unit-of-work helpers (*_in)          │
//! │  ────────────────────              ───────────────────────────          │
//! │  db.orders().get(id)               OrderRepository::insert_item_in(     │
//! │  db.ledgers().notes(customer)          &mut tx, &item)                  │
//! │  db.products().insert(..)                                               │
//! │       │                                   │                             │
//! │       │ own connection,                   │ caller's transaction,       │
//! │       │ no locks needed                   │ caller holds the locks      │
//! │       ▼                                   ▼                             │
//! │  SQLite Database  ◄───────────────  ReconciliationEngine                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog, price changes
//! - [`CustomerRepository`](customer::CustomerRepository) - Customers + ledger provisioning
//! - [`OrderRepository`](order::OrderRepository) - Orders, line items, daily summary
//! - [`LedgerRepository`](ledger::LedgerRepository) - Balances and balance notes

pub mod customer;
pub mod ledger;
pub mod order;
pub mod product;
