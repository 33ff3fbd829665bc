//! # Inventory Adjustor
//!
//! The only writer of `products.stock`.
//!
//! Each call locks nothing itself: it checks that the caller's `LockSet`
//! already holds `product:{id}`, then does read → `next_stock` → write on
//! the caller's transaction. A rejected adjustment writes nothing, and the
//! caller's `?` rolls back whatever else the unit of work staged.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::locks::{LockKey, LockSet};
use crate::repository::product::ProductRepository;
use tally_core::inventory::next_stock;
use tally_core::Product;

/// Applies ordered-quantity changes to product stock.
pub struct InventoryAdjustor<'a> {
    locks: &'a LockSet,
}

impl<'a> InventoryAdjustor<'a> {
    pub fn new(locks: &'a LockSet) -> Self {
        InventoryAdjustor { locks }
    }

    /// Moves stock by `−quantity_delta` for one product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - The product after the write
    /// * `Err(InsufficientStock)` - Stock would go below zero; nothing written
    /// * `Err(UnknownEntity)` - No such product
    pub async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity_delta: i64,
    ) -> DbResult<Product> {
        let key = LockKey::product(product_id);
        if !self.locks.holds(&key) {
            return Err(DbError::Internal(format!("stock adjusted without holding {}", key)));
        }

        let mut product = ProductRepository::fetch_in(conn, product_id).await?;
        if quantity_delta == 0 {
            return Ok(product);
        }

        let stock = next_stock(product_id, product.stock, quantity_delta)?;

        let now = Utc::now();
        ProductRepository::set_stock_in(conn, product_id, stock, now).await?;

        debug!(
            product_id = %product_id,
            from = product.stock,
            to = stock,
            "Stock adjusted"
        );

        product.stock = stock;
        product.updated_at = now;
        Ok(product)
    }

    /// Applies netted per-product deltas, one write per product, in key
    /// order.
    pub async fn apply_all(
        &self,
        conn: &mut SqliteConnection,
        deltas: &BTreeMap<String, i64>,
    ) -> DbResult<()> {
        for (product_id, delta) in deltas {
            self.adjust(conn, product_id, *delta).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::{CoreError, Money};

    #[tokio::test]
    async fn test_adjust_requires_product_lock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert("W", "Widget", Money::from_cents(500), 10)
            .await
            .unwrap();

        let locks = db.locks().acquire(vec![LockKey::product("other")]).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let err = InventoryAdjustor::new(&locks)
            .adjust(&mut conn, &product.id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Internal(_)));
    }

    #[tokio::test]
    async fn test_adjust_moves_stock_opposite_to_quantity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert("W", "Widget", Money::from_cents(500), 10)
            .await
            .unwrap();

        let locks = db.locks().acquire(vec![LockKey::product(product.id.clone())]).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let adjustor = InventoryAdjustor::new(&locks);

        assert_eq!(adjustor.adjust(&mut conn, &product.id, 3).await.unwrap().stock, 7);
        assert_eq!(adjustor.adjust(&mut conn, &product.id, -2).await.unwrap().stock, 9);

        let err = adjustor.adjust(&mut conn, &product.id, 10).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InsufficientStock { .. })));
        drop(conn);

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 9);
    }
}
