//! # Order Repository
//!
//! Reads of orders and their line items, daily analytics, and the row-level
//! writes the reconciliation engine composes into units of work.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── insert order row (total already computed)                      │
//! │     └── insert line items (price + name snapshot)                      │
//! │                                                                         │
//! │  2. UPDATE (any number of times)                                       │
//! │     └── resize / delete / insert line items                            │
//! │     └── rewrite total + supplement once                                │
//! │                                                                         │
//! │  3. DELETE                                                             │
//! │     └── delete line items (stock already returned)                     │
//! │     └── delete order row                                               │
//! │                                                                         │
//! │  Every step runs inside an engine transaction; this module never       │
//! │  touches stock or ledgers.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Days, NaiveDate, NaiveTime};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{LineItem, Money, Order, OrderAggregate, OrderSummary};

const SELECT_ORDER: &str = r#"
    SELECT id, customer_id, total_cents, supplement_cents, created_at, updated_at
    FROM orders
"#;

const SELECT_ITEMS: &str = r#"
    SELECT id, order_id, product_id, name_snapshot, unit_price_cents, quantity,
           line_total_cents, created_at, updated_at
    FROM line_items
    WHERE order_id = ?1
    ORDER BY created_at, rowid
"#;

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order with its line items.
    ///
    /// ## Returns
    /// * `Err(UnknownEntity)` - No such order
    pub async fn get(&self, id: &str) -> DbResult<OrderAggregate> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_aggregate_in(&mut conn, id).await
    }

    /// Lists a customer's orders, newest first (without items).
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "{SELECT_ORDER} WHERE customer_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Totals over the orders created on `date` (UTC).
    ///
    /// ## Returns
    /// * `products_count` - Σ quantity over all line items of those orders
    /// * `products_total` - Σ order totals
    /// * `supplements_total` - Σ supplements
    /// * `amount_to_pay_total` - products_total + supplements_total
    pub async fn daily_summary(&self, date: NaiveDate) -> DbResult<OrderSummary> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| DbError::Internal(format!("date out of range: {}", date)))?
            .and_time(NaiveTime::MIN)
            .and_utc();

        debug!(%date, "Computing daily order summary");

        let (products_total, supplements_total): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(total_cents), 0), COALESCE(SUM(supplement_cents), 0)
            FROM orders
            WHERE created_at >= ?1 AND created_at < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let products_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(li.quantity), 0)
            FROM line_items li
            INNER JOIN orders o ON o.id = li.order_id
            WHERE o.created_at >= ?1 AND o.created_at < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let products_total = Money::from_cents(products_total);
        let supplements_total = Money::from_cents(supplements_total);

        Ok(OrderSummary {
            products_count,
            products_total,
            supplements_total,
            amount_to_pay_total: products_total + supplements_total,
        })
    }

    // =========================================================================
    // Unit-of-work helpers
    // =========================================================================

    /// Reads an order and its items on one connection.
    pub(crate) async fn fetch_aggregate_in(conn: &mut SqliteConnection, id: &str) -> DbResult<OrderAggregate> {
        let order = sqlx::query_as::<_, Order>(&format!("{SELECT_ORDER} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        let items = sqlx::query_as::<_, LineItem>(SELECT_ITEMS)
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(OrderAggregate { order, items })
    }

    pub(crate) async fn insert_order_in(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, total_cents, supplement_cents, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(order.total_cents)
        .bind(order.supplement_cents)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Rewrites the derived total and the supplement.
    pub(crate) async fn update_totals_in(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET total_cents = ?2, supplement_cents = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&order.id)
        .bind(order.total_cents)
        .bind(order.supplement_cents)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order.id.clone()));
        }
        Ok(())
    }

    pub(crate) async fn delete_order_in(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", id));
        }
        Ok(())
    }

    pub(crate) async fn insert_item_in(conn: &mut SqliteConnection, item: &LineItem) -> DbResult<()> {
        debug!(item_id = %item.id, product_id = %item.product_id, quantity = item.quantity, "Inserting line item");

        sqlx::query(
            r#"
            INSERT INTO line_items (
                id, order_id, product_id, name_snapshot, unit_price_cents,
                quantity, line_total_cents, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Writes a new quantity and line total; the unit price is untouched.
    pub(crate) async fn resize_item_in(conn: &mut SqliteConnection, item: &LineItem) -> DbResult<()> {
        debug!(item_id = %item.id, quantity = item.quantity, "Resizing line item");

        let result = sqlx::query(
            r#"
            UPDATE line_items SET quantity = ?2, line_total_cents = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&item.id)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LineItem", item.id.clone()));
        }
        Ok(())
    }

    pub(crate) async fn delete_item_in(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        debug!(item_id = %id, "Deleting line item");

        let result = sqlx::query("DELETE FROM line_items WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LineItem", id));
        }
        Ok(())
    }
}
