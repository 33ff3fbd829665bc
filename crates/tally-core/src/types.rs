//! # Domain Types
//!
//! Core domain records used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Order       │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  sku            │   │  customer_id    │   │  name           │       │
//! │  │  price_cents    │   │  total_cents    │   └────────┬────────┘       │
//! │  │  stock          │   │  supplement     │            │ 1:1            │
//! │  └────────▲────────┘   └────────┬────────┘   ┌────────▼────────┐       │
//! │           │ references          │ owns       │     Ledger      │       │
//! │  ┌────────┴─────────────────────▼──────┐     │ (ledger.rs)     │       │
//! │  │              LineItem               │     └─────────────────┘       │
//! │  │  unit_price_cents (snapshot)        │                               │
//! │  │  quantity, line_total_cents         │                               │
//! │  └─────────────────────────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A line item copies the product's price and name when it is created.
//! Later price changes on the product never touch existing line items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ledger::LedgerAccount;
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product that can be ordered.
///
/// Owned by the inventory subsystem. `stock` only changes through the
/// inventory adjustor, which holds the product's lock while it writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name; copied into line items at creation.
    pub name: String,

    /// Current price in cents.
    pub price_cents: i64,

    /// Units on hand. Never negative after a committed unit of work.
    pub stock: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer. Each customer owns exactly one ledger, provisioned when the
/// customer is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Line Item
// =============================================================================

/// A priced quantity of one product within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LineItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of creation (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of creation (frozen).
    pub unit_price_cents: i64,
    /// Always positive.
    pub quantity: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn line_total(unit_price: Money, quantity: i64) -> CoreResult<Money> {
    unit_price
        .checked_multiply_quantity(quantity)
        .ok_or_else(|| CoreError::overflow("line total"))
}

impl LineItem {
    /// Creates a line item, snapshotting the product's current price and name.
    ///
    /// Fails with `Overflow` when price × quantity leaves `i64` cents.
    pub fn snapshot(
        id: impl Into<String>,
        order_id: impl Into<String>,
        product: &Product,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let line_total = line_total(product.price(), quantity)?;
        Ok(LineItem {
            id: id.into(),
            order_id: order_id.into(),
            product_id: product.id.clone(),
            name_snapshot: product.name.clone(),
            unit_price_cents: product.price_cents,
            quantity,
            line_total_cents: line_total.cents(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns a copy with a new quantity; the unit price snapshot is kept.
    pub fn with_quantity(&self, quantity: i64, now: DateTime<Utc>) -> CoreResult<Self> {
        let line_total = line_total(self.unit_price(), quantity)?;
        Ok(LineItem {
            quantity,
            line_total_cents: line_total.cents(),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Order
// =============================================================================

/// The persisted order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    /// Σ line totals. Derived; written once per unit of work.
    pub total_cents: i64,
    /// Flat additional charge (may be negative for a discount).
    pub supplement_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn supplement(&self) -> Money {
        Money::from_cents(self.supplement_cents)
    }

    /// What the customer owes for this order: `total + supplement`.
    ///
    /// This is the figure whose deltas are posted to the ledger's
    /// `orders_total` account.
    #[inline]
    pub fn amount_to_pay(&self) -> Money {
        self.total() + self.supplement()
    }
}

/// An order together with its current line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub order: Order,
    pub items: Vec<LineItem>,
}

impl OrderAggregate {
    #[inline]
    pub fn id(&self) -> &str {
        &self.order.id
    }

    #[inline]
    pub fn customer_id(&self) -> &str {
        &self.order.customer_id
    }

    #[inline]
    pub fn total(&self) -> Money {
        self.order.total()
    }

    #[inline]
    pub fn amount_to_pay(&self) -> Money {
        self.order.amount_to_pay()
    }

    /// Σ of the current line totals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// True when the stored total equals the sum of line totals.
    pub fn is_consistent(&self) -> bool {
        self.total() == self.items_total()
    }

    /// Product ids referenced by the current items, deduplicated.
    pub fn product_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.iter().map(|i| i.product_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// =============================================================================
// Balance Note
// =============================================================================

/// Immutable audit record appended for every external ledger deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BalanceNote {
    pub id: String,
    pub customer_id: String,
    pub account: LedgerAccount,
    pub amount_cents: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl BalanceNote {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One requested (product, quantity) entry.
///
/// `item_id` set means "modify this existing line item in place";
/// unset means "create a fresh line item".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    #[serde(default)]
    pub item_id: Option<String>,
    pub product_id: String,
    pub quantity: i64,
}

impl ItemRequest {
    /// Request for a new line item.
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        ItemRequest {
            item_id: None,
            product_id: product_id.into(),
            quantity,
        }
    }

    /// Request targeting an existing line item.
    pub fn existing(item_id: impl Into<String>, product_id: impl Into<String>, quantity: i64) -> Self {
        ItemRequest {
            item_id: Some(item_id.into()),
            product_id: product_id.into(),
            quantity,
        }
    }
}

impl From<&LineItem> for ItemRequest {
    fn from(item: &LineItem) -> Self {
        ItemRequest::existing(item.id.clone(), item.product_id.clone(), item.quantity)
    }
}

/// Input for order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub items: Vec<ItemRequest>,
    #[serde(default)]
    pub supplement: Money,
}

/// Input for order update: the full target item set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub items: Vec<ItemRequest>,
    /// New supplement; `None` keeps the current one.
    #[serde(default)]
    pub supplement: Option<Money>,
}

impl OrderUpdate {
    /// Target set that leaves every current item untouched.
    pub fn unchanged_from(aggregate: &OrderAggregate) -> Self {
        OrderUpdate {
            items: aggregate.items.iter().map(ItemRequest::from).collect(),
            supplement: None,
        }
    }
}

// =============================================================================
// Analytics
// =============================================================================

/// Totals over the orders created on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderSummary {
    /// Σ quantity over all line items.
    pub products_count: i64,
    /// Σ order totals (excluding supplements).
    pub products_total: Money,
    /// Σ supplements.
    pub supplements_total: Money,
    /// products_total + supplements_total.
    pub amount_to_pay_total: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================
