//! # Store Handle
//!
//! Opens the SQLite store and pairs its pool with the lock table.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  DbConfig::new(path) / in_memory()   pool size, lock timeout            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await         connect, then migrate              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────┐   ┌─────────────────────────────┐     │
//! │  │        SqlitePool           │   │        LockManager          │     │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐   │   │  order:…  ledger:…          │     │
//! │  │  │Conn1│ │Conn2│ │Conn3│   │   │  product:…                  │     │
//! │  │  └─────┘ └─────┘ └─────┘   │   │  (one per in-flight key)    │     │
//! │  └─────────────────────────────┘   └─────────────────────────────┘     │
//! │       │                                  │                              │
//! │       └──────────────┬───────────────────┘                              │
//! │                      ▼                                                  │
//! │         db.engine()  → ReconciliationEngine (units of work)            │
//! │         db.orders()  → OrderRepository (reads, analytics)              │
//! │         db.ledgers() → LedgerRepository (reads)                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases run in WAL mode so readers never block the single writer.
//! In-memory databases use one connection; every handle shares it.
//!
//! ## Write Transactions
//! Every write opens with `BEGIN IMMEDIATE` (see [`begin_write`]). A deferred
//! `BEGIN` reads first and upgrades later; in WAL mode that upgrade fails
//! at once with SQLITE_BUSY when another connection committed in between,
//! and the busy timeout never applies. Taking the write lock up front
//! makes concurrent writers queue on `lock_timeout` instead.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::engine::ReconciliationEngine;
use crate::error::{DbError, DbResult};
use crate::locks::LockManager;
use crate::migrations;
use crate::repository::customer::CustomerRepository;
use crate::repository::ledger::LedgerRepository;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;

const MEMORY_PATH: &str = ":memory:";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Where the store lives and how callers wait on it.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tally/tally.db")
///     .max_connections(8)
///     .lock_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Pool ceiling. Default: 5
    pub max_connections: u32,

    /// Connections opened eagerly. Default: 1
    pub min_connections: u32,

    /// Wait for a free pooled connection. Default: 30s
    pub connect_timeout: Duration,

    /// `None` keeps idle connections forever. Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Apply embedded migrations on startup. Default: true
    pub run_migrations: bool,

    /// Bound on each keyed-lock wait, and on SQLite's own busy wait.
    /// Exceeding it yields `LockConflict`. Default: 5s
    pub lock_timeout: Duration,
}

impl DbConfig {
    /// File-backed store at `path` (created on first connect).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            connect_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            run_migrations: true,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Private in-memory store, used by tests.
    ///
    /// Holds exactly one connection that never idles out: the data lives
    /// only as long as that connection.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            idle_timeout: None,
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(MEMORY_PATH)
    }

    /// Per-connection SQLite settings.
    ///
    /// File stores get WAL (readers never block the writer) with NORMAL
    /// sync. Both kinds enforce foreign keys and wait `lock_timeout` on a
    /// busy file before failing.
    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let base = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true)
        };

        Ok(base.foreign_keys(true).busy_timeout(self.lock_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout);

        if self.is_in_memory() {
            options.max_lifetime(None)
        } else {
            options
        }
    }
}

/// Opens a write transaction holding SQLite's write lock from the start.
///
/// Waits up to the connection's busy timeout for another writer to finish;
/// past that the error maps to `LockConflict`.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

// =============================================================================
// Database
// =============================================================================

/// Handle to one Tally store: the pool plus the lock table every unit of
/// work on it shares.
///
/// Clones share both, so they serialize on the same keys.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::in_memory()).await?;
/// let customer = db.customers().create("Ada").await?;
/// let order = db.engine().create_order(new_order).await?;
/// let owed = db.engine().amount_to_pay(&customer.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    locks: LockManager,
}

impl Database {
    /// Opens (or creates) the store and brings its schema up to date.
    ///
    /// ## Errors
    /// * `ConnectionFailed` - The file cannot be opened or created
    /// * `MigrationFailed` - An embedded migration did not apply
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening store");

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            lock_timeout_ms = config.lock_timeout.as_millis() as u64,
            in_memory = config.is_in_memory(),
            "Pool ready"
        );

        let db = Database {
            pool,
            locks: LockManager::new(config.lock_timeout),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations; a no-op when the schema is current.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the shared lock manager.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Returns the reconciliation engine. Every mutation of stock, orders
    /// or ledgers goes through it.
    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(self.pool.clone(), self.locks.clone())
    }

    /// Catalog reads and price changes. Stock moves only through the engine.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    /// Order reads and daily analytics.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    /// Ledger and balance-note reads.
    pub fn ledgers(&self) -> LedgerRepository {
        LedgerRepository::new(self.pool.clone())
    }

    /// Waits for checked-out connections to return, then closes them all.
    pub async fn close(&self) {
        info!("Closing store");
        self.pool.close().await;
    }

    /// True when a trivial query round-trips.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
        assert!(db.products().list().await.unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_keeps_its_single_connection() {
        let config = DbConfig::in_memory();
        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = DbConfig::new("/tmp/tally.db")
            .max_connections(8)
            .lock_timeout(Duration::from_millis(250))
            .run_migrations(false);

        assert!(!config.is_in_memory());
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert!(!config.run_migrations);
    }

    #[tokio::test]
    async fn test_clones_share_locks() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let other = db.clone();

        let _held = db
            .locks()
            .acquire(vec![crate::locks::LockKey::ledger("c-1")])
            .await
            .unwrap();
        assert_eq!(other.locks().tracked(), 1);
    }

    #[tokio::test]
    async fn test_write_transaction_rolls_back_on_drop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = begin_write(db.pool()).await.unwrap();
        sqlx::query("INSERT INTO customers (id, name, created_at) VALUES ('c-1', 'Ada', ?1)")
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await
            .unwrap();
        drop(tx);

        assert!(db.customers().get_by_id("c-1").await.unwrap().is_none());
    }
}
