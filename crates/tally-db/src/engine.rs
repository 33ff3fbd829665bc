//! # Reconciliation Engine
//!
//! Owns every unit of work that changes stock, orders or ledgers.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  update_order(order_id, target)                         │
//! │                                                                         │
//! │  validate target                    (no locks, no I/O)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lock order:{id} ──► read aggregate ──► lock ledger:{customer}         │
//! │                                          + product:{old ∪ target}      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE                                                       │
//! │   ├── re-read aggregate                                                │
//! │   ├── plan_update(old, target)       unchanged/resized/removed/added   │
//! │   ├── InventoryAdjustor per product  net delta, InsufficientStock?     │
//! │   ├── resize / delete / insert items                                   │
//! │   ├── recompute(final items)         once                              │
//! │   ├── write order total                                                │
//! │   └── post delta to orders_total     NegativeBalance?                  │
//! │  COMMIT  (any `?` above → tx dropped → ROLLBACK)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LockSet dropped                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Create, delete, deposit and restock follow the same shape with fewer
//! steps. Locks are always taken before a connection is checked out.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::inventory::InventoryAdjustor;
use crate::locks::{LockKey, LockManager, LockSet};
use crate::pool::begin_write;
use crate::repository::ledger::LedgerRepository;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use tally_core::inventory::net_quantity_deltas;
use tally_core::validation::{
    validate_deposit_amount, validate_new_items, validate_note, validate_restock, validate_supplement,
    validate_target_items,
};
use tally_core::{
    plan_update, recompute, BalanceNote, CoreError, ItemRequest, Ledger, LedgerAccount, LineItem,
    Money, NewOrder, Order, OrderAggregate, OrderUpdate, Product,
};

/// Runs order and ledger mutations as locked, transactional units of work.
///
/// ## Usage
/// ```rust,ignore
/// let engine = db.engine();
/// let order = engine
///     .create_order(NewOrder {
///         customer_id: customer.id.clone(),
///         items: vec![ItemRequest::new(widget.id.clone(), 3)],
///         supplement: Money::zero(),
///     })
///     .await?;
/// engine.deposit(&customer.id, LedgerAccount::PaidAmount, order.amount_to_pay(), None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    pool: SqlitePool,
    locks: LockManager,
}

impl ReconciliationEngine {
    pub fn new(pool: SqlitePool, locks: LockManager) -> Self {
        ReconciliationEngine { pool, locks }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Creates an order and posts its payable amount to the customer's
    /// `orders_total`.
    ///
    /// ## Errors
    /// * `UnknownEntity` - Unknown customer or product
    /// * `InsufficientStock` - A product cannot cover the requested quantity
    /// * `InvalidOrder` - Item ids supplied, or the ledger rejected the posting
    pub async fn create_order(&self, request: NewOrder) -> DbResult<OrderAggregate> {
        let result = self.try_create_order(&request).await;
        log_rejection("create_order", &result);
        result
    }

    async fn try_create_order(&self, request: &NewOrder) -> DbResult<OrderAggregate> {
        validate_new_items(&request.items)?;
        validate_supplement(request.supplement)?;
        if let Some(item_id) = request.items.iter().find_map(|item| item.item_id.as_deref()) {
            return Err(CoreError::InvalidOrder(format!(
                "a new order cannot reference existing line item {}",
                item_id
            ))
            .into());
        }

        let mut keys = vec![LockKey::ledger(request.customer_id.clone())];
        keys.extend(request.items.iter().map(|item| LockKey::product(item.product_id.clone())));
        let locks = self.locks.acquire(keys).await?;

        let mut tx = begin_write(&self.pool).await?;

        // Customer must exist; its ledger is provisioned with it
        LedgerRepository::fetch_in(&mut tx, &request.customer_id).await?;

        let products = fetch_products(&mut tx, &request.items).await?;
        let deltas = net_quantity_deltas(
            request
                .items
                .iter()
                .map(|item| (item.product_id.as_str(), item.quantity)),
        );
        InventoryAdjustor::new(&locks).apply_all(&mut tx, &deltas).await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();
        let items = snapshot_items(&order_id, &request.items, &products, now)?;
        let totals = recompute(&items, request.supplement, Money::zero());

        let order = Order {
            id: order_id,
            customer_id: request.customer_id.clone(),
            total_cents: totals.total.cents(),
            supplement_cents: request.supplement.cents(),
            created_at: now,
            updated_at: now,
        };
        OrderRepository::insert_order_in(&mut tx, &order).await?;
        for item in &items {
            OrderRepository::insert_item_in(&mut tx, item).await?;
        }

        if !totals.delta.is_zero() {
            post(&mut tx, &locks, &order.customer_id, LedgerAccount::OrdersTotal, totals.delta)
                .await
                .map_err(|err| match err {
                    DbError::Domain(CoreError::NegativeBalance { .. }) => {
                        DbError::Domain(CoreError::InvalidOrder(err.to_string()))
                    }
                    other => other,
                })?;
        }

        tx.commit().await?;
        drop(locks);

        info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            items = items.len(),
            total = %totals.total,
            delta = %totals.delta,
            "Order created"
        );
        Ok(OrderAggregate { order, items })
    }

    /// Reconciles an order with a new target item set (and optionally a new
    /// supplement).
    ///
    /// Target entries carrying an `item_id` modify that line item in place;
    /// entries without one become new line items; current items missing
    /// from the target are removed and their stock returned. Re-running with
    /// the current item set changes nothing. An empty target removes every
    /// line item; the order remains with a zero total and its supplement.
    ///
    /// ## Errors
    /// * `UnknownEntity` - Unknown order, line item or product
    /// * `DuplicateItem` / `InvalidOrder` - Malformed target set
    /// * `InsufficientStock` - A product cannot cover an increase
    /// * `NegativeBalance` - The ledger cannot absorb the delta
    pub async fn update_order(&self, order_id: &str, update: OrderUpdate) -> DbResult<OrderAggregate> {
        let result = self.try_update_order(order_id, &update).await;
        log_rejection("update_order", &result);
        result
    }

    async fn try_update_order(&self, order_id: &str, update: &OrderUpdate) -> DbResult<OrderAggregate> {
        validate_target_items(&update.items)?;
        if let Some(supplement) = update.supplement {
            validate_supplement(supplement)?;
        }

        let mut locks = self.locks.acquire(vec![LockKey::order(order_id)]).await?;
        let current = self.read_aggregate(order_id).await?;

        let mut keys = vec![LockKey::ledger(current.customer_id())];
        keys.extend(current.product_ids().into_iter().map(LockKey::Product));
        keys.extend(update.items.iter().map(|item| LockKey::product(item.product_id.clone())));
        self.locks.extend(&mut locks, keys).await?;

        let mut tx = begin_write(&self.pool).await?;
        let current = OrderRepository::fetch_aggregate_in(&mut tx, order_id).await?;

        let plan = plan_update(&current.items, &update.items)?;
        let supplement = update.supplement.unwrap_or_else(|| current.order.supplement());

        if plan.is_noop() && supplement == current.order.supplement() {
            tx.rollback().await?;
            info!(order_id = %order_id, "Order update is a no-op");
            return Ok(current);
        }

        let added_products = fetch_products(&mut tx, &plan.added).await?;
        InventoryAdjustor::new(&locks)
            .apply_all(&mut tx, &plan.quantity_deltas())
            .await?;

        let now = Utc::now();
        let mut final_items: Vec<LineItem> = plan.unchanged.clone();

        for resize in &plan.resized {
            let item = resize.item.with_quantity(resize.new_quantity, now)?;
            OrderRepository::resize_item_in(&mut tx, &item).await?;
            final_items.push(item);
        }

        for item in &plan.removed {
            OrderRepository::delete_item_in(&mut tx, &item.id).await?;
        }

        for item in snapshot_items(order_id, &plan.added, &added_products, now)? {
            OrderRepository::insert_item_in(&mut tx, &item).await?;
            final_items.push(item);
        }

        let totals = recompute(&final_items, supplement, current.amount_to_pay());
        let order = Order {
            total_cents: totals.total.cents(),
            supplement_cents: supplement.cents(),
            updated_at: now,
            ..current.order.clone()
        };
        OrderRepository::update_totals_in(&mut tx, &order).await?;

        if !totals.delta.is_zero() {
            post(&mut tx, &locks, &order.customer_id, LedgerAccount::OrdersTotal, totals.delta).await?;
        }

        let updated = OrderRepository::fetch_aggregate_in(&mut tx, order_id).await?;
        tx.commit().await?;
        drop(locks);

        info!(
            order_id = %order_id,
            resized = plan.resized.len(),
            removed = plan.removed.len(),
            added = plan.added.len(),
            total = %totals.total,
            delta = %totals.delta,
            "Order updated"
        );
        Ok(updated)
    }

    /// Deletes an order, returning its stock and reversing its payable
    /// amount on the ledger.
    ///
    /// ## Errors
    /// * `UnknownEntity` - Unknown order
    /// * `InvalidOperation` - `orders_total` cannot absorb the reversal;
    ///   nothing changes
    pub async fn delete_order(&self, order_id: &str) -> DbResult<()> {
        let result = self.try_delete_order(order_id).await;
        log_rejection("delete_order", &result);
        result
    }

    async fn try_delete_order(&self, order_id: &str) -> DbResult<()> {
        let mut locks = self.locks.acquire(vec![LockKey::order(order_id)]).await?;
        let current = self.read_aggregate(order_id).await?;

        let mut keys = vec![LockKey::ledger(current.customer_id())];
        keys.extend(current.product_ids().into_iter().map(LockKey::Product));
        self.locks.extend(&mut locks, keys).await?;

        let mut tx = begin_write(&self.pool).await?;
        let current = OrderRepository::fetch_aggregate_in(&mut tx, order_id).await?;
        let reversal = -current.amount_to_pay();

        // Checked before anything is written
        let ledger = LedgerRepository::fetch_in(&mut tx, current.customer_id()).await?;
        if ledger.apply(LedgerAccount::OrdersTotal, reversal).is_err() {
            return Err(CoreError::InvalidOperation(format!(
                "deleting order {} would reverse {} but orders_total is {}",
                order_id,
                current.amount_to_pay(),
                ledger.orders_total()
            ))
            .into());
        }

        let returned = net_quantity_deltas(
            current
                .items
                .iter()
                .map(|item| (item.product_id.as_str(), -item.quantity)),
        );
        InventoryAdjustor::new(&locks).apply_all(&mut tx, &returned).await?;

        for item in &current.items {
            OrderRepository::delete_item_in(&mut tx, &item.id).await?;
        }
        OrderRepository::delete_order_in(&mut tx, order_id).await?;

        if !reversal.is_zero() {
            post(&mut tx, &locks, current.customer_id(), LedgerAccount::OrdersTotal, reversal).await?;
        }

        tx.commit().await?;
        drop(locks);

        info!(order_id = %order_id, reversal = %reversal, "Order deleted");
        Ok(())
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Applies an external signed deposit to one ledger account and records
    /// a balance note.
    ///
    /// ## Arguments
    /// * `note` - Free text; defaults to "`{amount} deposited to {account}`"
    ///
    /// ## Errors
    /// * `NegativeBalance` - The account would go below zero; nothing changes
    /// * `UnknownEntity` - Unknown customer
    pub async fn deposit(
        &self,
        customer_id: &str,
        account: LedgerAccount,
        amount: Money,
        note: Option<&str>,
    ) -> DbResult<Ledger> {
        let result = self.try_deposit(customer_id, account, amount, note).await;
        log_rejection("deposit", &result);
        result
    }

    async fn try_deposit(
        &self,
        customer_id: &str,
        account: LedgerAccount,
        amount: Money,
        note: Option<&str>,
    ) -> DbResult<Ledger> {
        validate_deposit_amount(amount)?;
        let note = match note.map(str::trim).filter(|n| !n.is_empty()) {
            Some(text) => {
                validate_note(text)?;
                text.to_string()
            }
            None => format!("{} deposited to {}", amount, account),
        };

        let locks = self.locks.acquire(vec![LockKey::ledger(customer_id)]).await?;
        let mut tx = begin_write(&self.pool).await?;

        let ledger = post(&mut tx, &locks, customer_id, account, amount).await?;
        LedgerRepository::insert_note_in(
            &mut tx,
            &BalanceNote {
                id: Uuid::new_v4().to_string(),
                customer_id: customer_id.to_string(),
                account,
                amount_cents: amount.cents(),
                note,
                created_at: ledger.updated_at,
            },
        )
        .await?;

        tx.commit().await?;
        drop(locks);

        info!(
            customer_id = %customer_id,
            account = %account,
            amount = %amount,
            amount_to_pay = %ledger.amount_to_pay(),
            "Deposit accepted"
        );
        Ok(ledger)
    }

    /// `orders_total − paid_amount`. A plain read; takes no lock.
    pub async fn amount_to_pay(&self, customer_id: &str) -> DbResult<Money> {
        LedgerRepository::new(self.pool.clone())
            .amount_to_pay(customer_id)
            .await
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    /// Adds received units to a product's stock.
    pub async fn restock(&self, product_id: &str, quantity: i64) -> DbResult<Product> {
        let result = self.try_restock(product_id, quantity).await;
        log_rejection("restock", &result);
        result
    }

    async fn try_restock(&self, product_id: &str, quantity: i64) -> DbResult<Product> {
        validate_restock(quantity)?;

        let locks = self.locks.acquire(vec![LockKey::product(product_id)]).await?;
        let mut tx = begin_write(&self.pool).await?;

        // Receiving stock is the same as ordering a negative quantity
        let product = InventoryAdjustor::new(&locks)
            .adjust(&mut tx, product_id, -quantity)
            .await?;

        tx.commit().await?;
        drop(locks);

        info!(product_id = %product_id, quantity, stock = product.stock, "Product restocked");
        Ok(product)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Reads an aggregate on a short-lived connection, outside any
    /// transaction, to learn which further keys to lock.
    async fn read_aggregate(&self, order_id: &str) -> DbResult<OrderAggregate> {
        let mut conn = self.pool.acquire().await?;
        OrderRepository::fetch_aggregate_in(&mut conn, order_id).await
    }
}

/// Posts to the ledger through the single write path.
async fn post(
    conn: &mut SqliteConnection,
    locks: &LockSet,
    customer_id: &str,
    account: LedgerAccount,
    amount: Money,
) -> DbResult<Ledger> {
    LedgerRepository::post_in(conn, locks, customer_id, account, amount).await
}

/// Loads every product referenced by `items`, once each.
async fn fetch_products(
    conn: &mut SqliteConnection,
    items: &[ItemRequest],
) -> DbResult<HashMap<String, Product>> {
    let ids: BTreeSet<&str> = items.iter().map(|item| item.product_id.as_str()).collect();
    let mut products = HashMap::with_capacity(ids.len());
    for id in ids {
        let product = ProductRepository::fetch_in(conn, id).await?;
        products.insert(id.to_string(), product);
    }
    Ok(products)
}

/// Builds fresh line items, snapshotting each product's price and name.
fn snapshot_items(
    order_id: &str,
    requests: &[ItemRequest],
    products: &HashMap<String, Product>,
    now: chrono::DateTime<Utc>,
) -> DbResult<Vec<LineItem>> {
    requests
        .iter()
        .map(|request| {
            let product = products
                .get(&request.product_id)
                .ok_or_else(|| DbError::not_found("Product", request.product_id.clone()))?;
            let item = LineItem::snapshot(
                Uuid::new_v4().to_string(),
                order_id,
                product,
                request.quantity,
                now,
            )?;
            Ok(item)
        })
        .collect()
}

fn log_rejection<T>(operation: &'static str, result: &DbResult<T>) {
    if let Err(err) = result {
        warn!(operation, error = %err, retryable = err.is_retryable(), "Operation rejected");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> (Database, String, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db.customers().create("Ada").await.unwrap();
        let widget = db
            .products()
            .insert("WIDGET", "Widget", Money::from_cents(500), 10)
            .await
            .unwrap();
        (db, customer.id, widget)
    }

    #[tokio::test]
    async fn test_create_rejects_item_ids() {
        let (db, customer_id, widget) = setup().await;
        let err = db
            .engine()
            .create_order(NewOrder {
                customer_id,
                items: vec![ItemRequest::existing("li-1", widget.id.clone(), 1)],
                supplement: Money::zero(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidOrder(_))));
    }

    #[tokio::test]
    async fn test_create_for_unknown_customer() {
        let (db, _, widget) = setup().await;
        let err = db
            .engine()
            .create_order(NewOrder {
                customer_id: "nobody".to_string(),
                items: vec![ItemRequest::new(widget.id.clone(), 1)],
                supplement: Money::zero(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::UnknownEntity { .. })));

        let stored = db.products().get_by_id(&widget.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
    }

    #[tokio::test]
    async fn test_negative_payable_on_create_is_invalid_order() {
        let (db, customer_id, widget) = setup().await;
        let err = db
            .engine()
            .create_order(NewOrder {
                customer_id,
                items: vec![ItemRequest::new(widget.id.clone(), 1)],
                supplement: Money::from_cents(-1000),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidOrder(_))));

        let stored = db.products().get_by_id(&widget.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
    }

    #[tokio::test]
    async fn test_deposit_default_note() {
        let (db, customer_id, _) = setup().await;
        db.engine()
            .deposit(&customer_id, LedgerAccount::PaidAmount, Money::from_cents(2500), None)
            .await
            .unwrap();
        db.engine()
            .deposit(&customer_id, LedgerAccount::PaidAmount, Money::from_cents(-500), Some("refund"))
            .await
            .unwrap();

        let notes = db.ledgers().notes(&customer_id).await.unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].note, "25.00 deposited to paid_amount");
        assert_eq!(notes[1].note, "refund");
        assert_eq!(notes[1].amount().cents(), -500);
    }

    #[tokio::test]
    async fn test_zero_deposit_rejected() {
        let (db, customer_id, _) = setup().await;
        let err = db
            .engine()
            .deposit(&customer_id, LedgerAccount::PaidAmount, Money::zero(), None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));
        assert!(db.ledgers().notes(&customer_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restock() {
        let (db, _, widget) = setup().await;
        let product = db.engine().restock(&widget.id, 5).await.unwrap();
        assert_eq!(product.stock, 15);
        assert!(db.engine().restock(&widget.id, 0).await.is_err());
        assert!(db.engine().restock("missing", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_restock_and_supplement_rejected() {
        let (db, customer_id, widget) = setup().await;

        let err = db.engine().restock(&widget.id, i64::MAX).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));

        let err = db
            .engine()
            .create_order(NewOrder {
                customer_id,
                items: vec![ItemRequest::new(widget.id.clone(), 1)],
                supplement: Money::from_cents(i64::MAX),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));

        let stored = db.products().get_by_id(&widget.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
    }

    #[tokio::test]
    async fn test_held_ledger_lock_yields_conflict() {
        let db = Database::new(DbConfig::in_memory().lock_timeout(std::time::Duration::from_millis(50)))
            .await
            .unwrap();
        let customer = db.customers().create("Ada").await.unwrap();

        let _held = db
            .locks()
            .acquire(vec![LockKey::ledger(customer.id.clone())])
            .await
            .unwrap();

        let err = db
            .engine()
            .deposit(&customer.id, LedgerAccount::PaidAmount, Money::from_cents(100), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::LockConflict { .. }));
        assert!(err.is_retryable());
    }
}
