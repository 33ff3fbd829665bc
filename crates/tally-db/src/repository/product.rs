//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Column        Written by                                               │
//! │  ───────────   ──────────────────────────────────────────────────────   │
//! │  sku, name     ProductRepository::insert                               │
//! │  price_cents   ProductRepository::insert / update_price                │
//! │                (existing line items keep their snapshot)               │
//! │  stock         InventoryAdjustor only, under the product's lock        │
//! │                (orders, deletes, ReconciliationEngine::restock)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::validation::{validate_name, validate_opening_stock, validate_price, validate_sku};
use tally_core::{Money, Product};

const SELECT_PRODUCT: &str = r#"
    SELECT id, sku, name, price_cents, stock, created_at, updated_at
    FROM products
"#;

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let widget = repo.insert("WIDGET-1", "Widget", Money::from_cents(500), 10).await?;
/// let found = repo.get_by_sku("WIDGET-1").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product with its opening stock.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, sku: &str, name: &str, price: Money, stock: i64) -> DbResult<Product> {
        validate_sku(sku)?;
        validate_name("name", name)?;
        validate_price(price)?;
        validate_opening_stock(stock)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: sku.trim().to_string(),
            name: name.trim().to_string(),
            price_cents: price.cents(),
            stock,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, price_cents, stock, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, product.sku.clone()),
            other => other,
        })?;

        Ok(product)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!("{SELECT_PRODUCT} WHERE sku = ?1"))
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists all products ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!("{SELECT_PRODUCT} ORDER BY name, sku"))
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Changes a product's price.
    ///
    /// Line items created afterwards snapshot the new price; existing line
    /// items keep the price they were created with.
    pub async fn update_price(&self, id: &str, price: Money) -> DbResult<Product> {
        validate_price(price)?;
        debug!(id = %id, price = %price, "Updating product price");

        let result = sqlx::query("UPDATE products SET price_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(price.cents())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    // =========================================================================
    // Unit-of-work helpers (caller holds the transaction and the locks)
    // =========================================================================

    /// Reads a product inside a unit of work.
    ///
    /// ## Returns
    /// * `Err(UnknownEntity)` - No such product
    pub(crate) async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Writes a new stock level.
    pub(crate) async fn set_stock_in(
        conn: &mut SqliteConnection,
        id: &str,
        stock: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET stock = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(stock)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::DbError;
    use tally_core::Money;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let widget = repo
            .insert("WIDGET-1", "Widget", Money::from_cents(500), 10)
            .await
            .unwrap();

        let by_id = repo.get_by_id(&widget.id).await.unwrap().unwrap();
        assert_eq!(by_id.sku, "WIDGET-1");
        assert_eq!(by_id.stock, 10);

        let by_sku = repo.get_by_sku("WIDGET-1").await.unwrap().unwrap();
        assert_eq!(by_sku.id, widget.id);

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert("DUP", "First", Money::from_cents(100), 1).await.unwrap();
        let err = repo
            .insert("DUP", "Second", Money::from_cents(100), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_price() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let widget = repo
            .insert("WIDGET-1", "Widget", Money::from_cents(500), 10)
            .await
            .unwrap();

        let updated = repo.update_price(&widget.id, Money::from_cents(650)).await.unwrap();
        assert_eq!(updated.price_cents, 650);

        assert!(repo.update_price("missing", Money::from_cents(1)).await.is_err());
        assert!(repo.update_price(&widget.id, Money::from_cents(-1)).await.is_err());
        assert!(repo.update_price(&widget.id, Money::from_cents(100_000)).await.is_err());
        assert!(repo
            .insert("HUGE", "Huge", Money::from_cents(500), i64::MAX)
            .await
            .is_err());
    }
}
