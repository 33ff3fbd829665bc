//! # Keyed Locks
//!
//! Exclusive, in-process locks keyed by entity identity.
//!
//! ## Lock Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      One Unit of Work                                   │
//! │                                                                         │
//! │  1. acquire(keys)   sorted: Order < Ledger < Product, then by id       │
//! │       │             each wait bounded by lock_timeout                  │
//! │       ▼                                                                 │
//! │  2. BEGIN                                                              │
//! │       │  read → check → write (stock, items, order, ledger)            │
//! │       ▼                                                                 │
//! │  3. COMMIT or ROLLBACK                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  4. LockSet dropped → every guard released (also on `?` / panic)       │
//! │                                                                         │
//! │  Every caller takes keys in the same total order, so two units of     │
//! │  work can never each hold a lock the other is waiting for.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are taken before a connection is checked out of the pool, so a
//! waiting unit of work never pins a connection.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

// =============================================================================
// Lock Key
// =============================================================================

/// Identity of a lockable record.
///
/// The derived `Ord` is the global acquisition order: variant first
/// (Order, then Ledger, then Product), then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Order(String),
    /// Keyed by customer id; one ledger per customer.
    Ledger(String),
    Product(String),
}

impl LockKey {
    pub fn order(id: impl Into<String>) -> Self {
        LockKey::Order(id.into())
    }

    pub fn ledger(customer_id: impl Into<String>) -> Self {
        LockKey::Ledger(customer_id.into())
    }

    pub fn product(id: impl Into<String>) -> Self {
        LockKey::Product(id.into())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Order(id) => write!(f, "order:{}", id),
            LockKey::Ledger(id) => write!(f, "ledger:{}", id),
            LockKey::Product(id) => write!(f, "product:{}", id),
        }
    }
}

// =============================================================================
// Lock Manager
// =============================================================================

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
struct LockTable {
    slots: Mutex<HashMap<LockKey, Slot>>,
}

impl LockTable {
    fn slot(&self, key: &LockKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.clone()).or_default().clone()
    }

    /// Forgets slots nobody holds or waits on.
    fn prune(&self, keys: &[LockKey]) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(key);
            }
        }
    }

    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Registry of keyed async mutexes shared by every unit of work.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone)]
pub struct LockManager {
    table: Arc<LockTable>,
    timeout: Duration,
}

impl LockManager {
    /// Creates a lock manager whose waits give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        LockManager {
            table: Arc::new(LockTable::default()),
            timeout,
        }
    }

    /// The per-key wait limit.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of keys currently held or waited on.
    pub fn tracked(&self) -> usize {
        self.table.len()
    }

    /// Acquires every key, in global order.
    ///
    /// ## Returns
    /// * `Ok(LockSet)` - All keys held until the set is dropped
    /// * `Err(DbError::LockConflict)` - A key was not free within the
    ///   timeout; every key taken so far has been released
    pub async fn acquire<I>(&self, keys: I) -> DbResult<LockSet>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let mut set = LockSet {
            guards: Vec::new(),
            table: Arc::clone(&self.table),
        };
        self.extend(&mut set, keys).await?;
        Ok(set)
    }

    /// Adds more keys to a held set.
    ///
    /// Keys already held are skipped. The new keys must all sort after
    /// every key already held, otherwise the global order would be broken.
    pub async fn extend<I>(&self, set: &mut LockSet, keys: I) -> DbResult<()>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let ordered: BTreeSet<LockKey> = keys
            .into_iter()
            .filter(|key| !set.holds(key))
            .collect();

        if let (Some(held), Some(first)) = (set.last_key(), ordered.first()) {
            if first < held {
                return Err(DbError::Internal(format!(
                    "lock order violation: {} requested while holding {}",
                    first, held
                )));
            }
        }

        for key in ordered {
            let guard = self.lock_one(&key).await?;
            set.guards.push((key, guard));
        }
        Ok(())
    }

    async fn lock_one(&self, key: &LockKey) -> DbResult<OwnedMutexGuard<()>> {
        let slot = self.table.slot(key);
        let started = Instant::now();

        match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
            Ok(guard) => {
                debug!(key = %key, waited_ms = started.elapsed().as_millis() as u64, "Lock acquired");
                Ok(guard)
            }
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(key = %key, waited_ms, "Lock wait timed out");
                self.table.prune(std::slice::from_ref(key));
                Err(DbError::LockConflict {
                    key: key.to_string(),
                    waited_ms,
                })
            }
        }
    }
}

// =============================================================================
// Lock Set
// =============================================================================

/// Guards held by one unit of work. Dropping the set releases them all.
pub struct LockSet {
    guards: Vec<(LockKey, OwnedMutexGuard<()>)>,
    table: Arc<LockTable>,
}

impl LockSet {
    /// True when `key` is held by this set.
    pub fn holds(&self, key: &LockKey) -> bool {
        self.guards.iter().any(|(held, _)| held == key)
    }

    /// Held keys in acquisition order.
    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.guards.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    fn last_key(&self) -> Option<&LockKey> {
        self.guards.last().map(|(key, _)| key)
    }
}

impl fmt::Debug for LockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        // Release in reverse acquisition order
        let mut released = Vec::with_capacity(self.guards.len());
        while let Some((key, guard)) = self.guards.pop() {
            drop(guard);
            released.push(key);
        }
        self.table.prune(&released);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order() {
        let mut keys = vec![
            LockKey::product("a"),
            LockKey::ledger("z"),
            LockKey::order("m"),
            LockKey::product("0"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                LockKey::order("m"),
                LockKey::ledger("z"),
                LockKey::product("0"),
                LockKey::product("a"),
            ]
        );
    }

    #[tokio::test]
    async fn test_acquire_sorts_and_dedups() {
        let locks = LockManager::new(Duration::from_millis(100));
        let set = locks
            .acquire(vec![
                LockKey::product("p2"),
                LockKey::ledger("c1"),
                LockKey::product("p1"),
                LockKey::product("p2"),
            ])
            .await
            .unwrap();

        let held: Vec<String> = set.keys().map(ToString::to_string).collect();
        assert_eq!(held, vec!["ledger:c1", "product:p1", "product:p2"]);
    }

    #[tokio::test]
    async fn test_held_key_times_out_with_conflict() {
        let locks = LockManager::new(Duration::from_millis(50));
        let _held = locks.acquire(vec![LockKey::ledger("c1")]).await.unwrap();

        let err = locks
            .acquire(vec![LockKey::ledger("c1")])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::LockConflict { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_drop_releases_and_prunes() {
        let locks = LockManager::new(Duration::from_millis(50));
        {
            let _set = locks
                .acquire(vec![LockKey::order("o1"), LockKey::product("p1")])
                .await
                .unwrap();
            assert_eq!(locks.tracked(), 2);
        }
        assert_eq!(locks.tracked(), 0);

        // Free again after release
        let again = locks.acquire(vec![LockKey::order("o1")]).await.unwrap();
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_acquire_releases_partial_set() {
        let locks = LockManager::new(Duration::from_millis(50));
        let _blocker = locks.acquire(vec![LockKey::product("p2")]).await.unwrap();

        let err = locks
            .acquire(vec![LockKey::product("p1"), LockKey::product("p2")])
            .await;
        assert!(err.is_err());

        // p1 was taken then released when the acquire failed
        let p1 = locks.acquire(vec![LockKey::product("p1")]).await;
        assert!(p1.is_ok());
    }

    #[tokio::test]
    async fn test_extend_rejects_out_of_order_keys() {
        let locks = LockManager::new(Duration::from_millis(50));
        let mut set = locks.acquire(vec![LockKey::product("p1")]).await.unwrap();

        let err = locks
            .extend(&mut set, vec![LockKey::ledger("c1")])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Internal(_)));

        // Re-requesting a held key is a no-op
        locks
            .extend(&mut set, vec![LockKey::product("p1"), LockKey::product("p2")])
            .await
            .unwrap();
        assert_eq!(set.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiter_proceeds_after_release() {
        let locks = LockManager::new(Duration::from_secs(2));
        let held = locks.acquire(vec![LockKey::ledger("c1")]).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(vec![LockKey::ledger("c1")]).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }
}
