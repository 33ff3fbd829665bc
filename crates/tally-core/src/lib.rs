//! # tally-core: Pure Business Logic for Tally
//!
//! This crate holds the rules that keep three quantities consistent:
//! per-product stock, an order's total, and a customer's ledger balance.
//! It performs no I/O; the `tally-db` crate wraps these rules in locked
//! units of work.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Request layer (REST / RPC / CLI, not in this repo)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        tally-db: ReconciliationEngine + repositories            │   │
//! │  │        (locks, transactions, SQLite)                            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  ledger   │  │ inventory │  │ reconcile │  │   │
//! │  │   │  Product  │  │  Ledger   │  │ next_stock│  │ plan diff │  │   │
//! │  │   │  LineItem │  │  deposit  │  │           │  │ recompute │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO LOCKS • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Customer, LineItem, Order, BalanceNote)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`ledger`] - Per-customer balance and the no-negative-balance rule
//! - [`inventory`] - Stock arithmetic for quantity changes
//! - [`reconcile`] - Diff of old vs requested line items, total recomputation
//! - [`error`] - Domain error types
//! - [`validation`] - Input rules
//!
//! ## Conventions
//!
//! - An order's payable amount is `total + supplement`.
//! - The ledger's `orders_total` account receives the signed delta of the
//!   payable amount; `amount_to_pay = orders_total - paid_amount`.
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::ledger::{Ledger, LedgerAccount};
//! use tally_core::money::Money;
//!
//! let ledger = Ledger::empty("customer-1");
//! let ledger = ledger.apply(LedgerAccount::OrdersTotal, Money::from_cents(2500)).unwrap();
//! let ledger = ledger.apply(LedgerAccount::PaidAmount, Money::from_cents(2500)).unwrap();
//! assert!(ledger.amount_to_pay().is_zero());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod inventory;
pub mod ledger;
pub mod money;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{Ledger, LedgerAccount};
pub use money::Money;
pub use reconcile::{plan_update, recompute, Recomputation, Resize, UpdatePlan};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single order.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of a free-text balance note.
pub const MAX_NOTE_LENGTH: usize = 500;

/// Highest product price: 999.99 (five significant digits).
pub const MAX_PRICE_CENTS: i64 = 99_999;

/// Largest magnitude of a single deposit or order supplement:
/// 18 digits of cents, well inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 999_999_999_999_999_999;

/// Largest opening stock or single restock.
pub const MAX_STOCK: i64 = 2_147_483_647;
