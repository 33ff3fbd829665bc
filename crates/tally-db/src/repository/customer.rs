//! # Customer Repository
//!
//! Customers and the provisioning of their ledger.
//!
//! Every customer gets exactly one ledger, written in the same transaction
//! as the customer row. Nothing else creates ledgers, so a read never has
//! to "get or create" one.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::pool::begin_write;
use crate::repository::ledger::LedgerRepository;
use tally_core::validation::validate_name;
use tally_core::{Customer, Ledger};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Creates a customer together with its zero ledger.
    pub async fn create(&self, name: &str) -> DbResult<Customer> {
        validate_name("name", name)?;

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            created_at: now,
        };

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query("INSERT INTO customers (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&customer.id)
            .bind(&customer.name)
            .bind(customer.created_at)
            .execute(&mut *tx)
            .await?;

        debug!(customer_id = %customer.id, "Provisioning ledger");
        let ledger = Ledger {
            updated_at: now,
            ..Ledger::empty(customer.id.clone())
        };
        LedgerRepository::insert_in(&mut tx, &ledger).await?;

        tx.commit().await?;

        info!(customer_id = %customer.id, "Customer created");
        Ok(customer)
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, name, created_at FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Lists customers in creation order.
    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT id, name, created_at FROM customers ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_create_provisions_zero_ledger() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let customer = db.customers().create("Ada").await.unwrap();
        let ledger = db.ledgers().get(&customer.id).await.unwrap();

        assert!(ledger.orders_total().is_zero());
        assert!(ledger.paid_amount().is_zero());
        assert_eq!(db.customers().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.customers().create("   ").await.is_err());
        assert!(db.customers().list().await.unwrap().is_empty());
    }
}
