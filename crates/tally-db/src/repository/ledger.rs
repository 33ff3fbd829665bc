//! # Ledger Repository
//!
//! Reads of customer ledgers and balance notes, plus the single write path
//! for ledger fields.
//!
//! ## Posting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  post_in(conn, locks, customer, account, amount)                       │
//! │       │                                                                 │
//! │       ├── ledger:{customer} not in LockSet? → Internal error           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT ledger row                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Ledger::apply(account, amount)                                        │
//! │       │                                                                 │
//! │       ├── would go negative → NegativeBalance, row untouched           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE ledger row                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::locks::{LockKey, LockSet};
use tally_core::{BalanceNote, Ledger, LedgerAccount, Money};

const SELECT_LEDGER: &str = r#"
    SELECT customer_id, orders_total_cents, paid_amount_cents, updated_at
    FROM ledgers
    WHERE customer_id = ?1
"#;

/// Repository for ledger reads. Writes go through `ReconciliationEngine`.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Gets a customer's ledger.
    ///
    /// ## Returns
    /// * `Err(UnknownEntity)` - No such customer
    pub async fn get(&self, customer_id: &str) -> DbResult<Ledger> {
        sqlx::query_as::<_, Ledger>(SELECT_LEDGER)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", customer_id))
    }

    /// `orders_total − paid_amount` for one customer.
    pub async fn amount_to_pay(&self, customer_id: &str) -> DbResult<Money> {
        Ok(self.get(customer_id).await?.amount_to_pay())
    }

    /// A customer's balance notes, oldest first.
    pub async fn notes(&self, customer_id: &str) -> DbResult<Vec<BalanceNote>> {
        let notes = sqlx::query_as::<_, BalanceNote>(
            r#"
            SELECT id, customer_id, account, amount_cents, note, created_at
            FROM balance_notes
            WHERE customer_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    // =========================================================================
    // Unit-of-work helpers
    // =========================================================================

    /// Writes a freshly provisioned ledger.
    pub(crate) async fn insert_in(conn: &mut SqliteConnection, ledger: &Ledger) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledgers (customer_id, orders_total_cents, paid_amount_cents, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&ledger.customer_id)
        .bind(ledger.orders_total_cents)
        .bind(ledger.paid_amount_cents)
        .bind(ledger.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Reads a ledger inside a unit of work.
    pub(crate) async fn fetch_in(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<Ledger> {
        sqlx::query_as::<_, Ledger>(SELECT_LEDGER)
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", customer_id))
    }

    /// Applies a signed deposit to one account. The only writer of ledger
    /// fields; the caller must hold `ledger:{customer_id}`.
    pub(crate) async fn post_in(
        conn: &mut SqliteConnection,
        locks: &LockSet,
        customer_id: &str,
        account: LedgerAccount,
        amount: Money,
    ) -> DbResult<Ledger> {
        let key = LockKey::ledger(customer_id);
        if !locks.holds(&key) {
            return Err(DbError::Internal(format!("ledger posted without holding {}", key)));
        }

        let current = Self::fetch_in(conn, customer_id).await?;
        let mut next = current.apply(account, amount)?;
        next.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE ledgers
            SET orders_total_cents = ?2, paid_amount_cents = ?3, updated_at = ?4
            WHERE customer_id = ?1
            "#,
        )
        .bind(customer_id)
        .bind(next.orders_total_cents)
        .bind(next.paid_amount_cents)
        .bind(next.updated_at)
        .execute(&mut *conn)
        .await?;

        debug!(
            customer_id = %customer_id,
            account = %account,
            amount = %amount,
            balance = %next.balance(account),
            "Ledger posted"
        );
        Ok(next)
    }

    /// Appends an audit note.
    pub(crate) async fn insert_note_in(conn: &mut SqliteConnection, note: &BalanceNote) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO balance_notes (id, customer_id, account, amount_cents, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&note.id)
        .bind(&note.customer_id)
        .bind(note.account)
        .bind(note.amount_cents)
        .bind(&note.note)
        .bind(note.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
