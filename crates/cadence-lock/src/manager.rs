//! LockManager — leased advisory locks over a shared redb database.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LockError, LockResult};

/// Active leases keyed by lock key.
const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");

/// A stored lease: who holds the key and until when.
#[derive(Debug, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    expires_at_ms: u64,
}

/// Hands out leased locks. Clones share the underlying database, so a
/// clone per scanner is cheap and exclusion covers every scanner holding
/// a clone. redb keeps the backing file exclusively locked, so the
/// database has one owning process at a time; leases outlive it on disk.
#[derive(Clone)]
pub struct LockManager {
    db: Arc<Database>,
    manager_id: String,
    counter: Arc<AtomicU64>,
}

impl LockManager {
    /// Open (or create) the shared lock database at the given path.
    pub fn open(path: &Path) -> LockResult<Self> {
        let db = Database::create(path).map_err(|e| LockError::Open(e.to_string()))?;
        Self::with_database(db)
    }

    /// Create an ephemeral in-memory lock database (for testing).
    pub fn open_in_memory() -> LockResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| LockError::Open(e.to_string()))?;
        Self::with_database(db)
    }

    fn with_database(db: Database) -> LockResult<Self> {
        let manager = Self {
            db: Arc::new(db),
            manager_id: generate_manager_id(),
            counter: Arc::new(AtomicU64::new(0)),
        };
        let txn = manager
            .db
            .begin_write()
            .map_err(|e| LockError::Storage(e.to_string()))?;
        txn.open_table(LEASES)
            .map_err(|e| LockError::Storage(e.to_string()))?;
        txn.commit().map_err(|e| LockError::Storage(e.to_string()))?;
        Ok(manager)
    }

    /// Attempt to acquire `key` for `ttl`. Non-blocking: returns `None`
    /// immediately when another unexpired holder exists. An expired
    /// lease is overwritten in place.
    pub fn try_acquire(&self, key: &str, ttl: Duration) -> LockResult<Option<LockGuard>> {
        let now = epoch_ms();
        let txn = self
            .db
            .begin_write()
            .map_err(|e| LockError::Storage(e.to_string()))?;
        let token;
        {
            let mut table = txn
                .open_table(LEASES)
                .map_err(|e| LockError::Storage(e.to_string()))?;

            let held = match table.get(key).map_err(|e| LockError::Storage(e.to_string()))? {
                Some(guard) => {
                    let lease: LeaseRecord = serde_json::from_slice(guard.value())
                        .map_err(|e| LockError::Encoding(e.to_string()))?;
                    lease.expires_at_ms > now
                }
                None => false,
            };
            if held {
                drop(table);
                txn.abort().map_err(|e| LockError::Storage(e.to_string()))?;
                debug!(%key, "lease held elsewhere");
                return Ok(None);
            }

            token = self.next_token();
            let lease = LeaseRecord {
                holder: token.clone(),
                expires_at_ms: now + ttl.as_millis() as u64,
            };
            let value =
                serde_json::to_vec(&lease).map_err(|e| LockError::Encoding(e.to_string()))?;
            table
                .insert(key, value.as_slice())
                .map_err(|e| LockError::Storage(e.to_string()))?;
        }
        txn.commit().map_err(|e| LockError::Storage(e.to_string()))?;

        debug!(%key, ?ttl, "lease acquired");
        Ok(Some(LockGuard {
            manager: self.clone(),
            key: key.to_string(),
            token,
            released: AtomicBool::new(false),
        }))
    }

    /// Remove the lease for `key` if `token` still holds it. Returns
    /// whether a lease was removed.
    fn release_token(&self, key: &str, token: &str) -> LockResult<bool> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| LockError::Storage(e.to_string()))?;
        let removed;
        {
            let mut table = txn
                .open_table(LEASES)
                .map_err(|e| LockError::Storage(e.to_string()))?;

            let ours = match table.get(key).map_err(|e| LockError::Storage(e.to_string()))? {
                Some(guard) => {
                    let lease: LeaseRecord = serde_json::from_slice(guard.value())
                        .map_err(|e| LockError::Encoding(e.to_string()))?;
                    lease.holder == token
                }
                None => false,
            };
            removed = ours
                && table
                    .remove(key)
                    .map_err(|e| LockError::Storage(e.to_string()))?
                    .is_some();
        }
        txn.commit().map_err(|e| LockError::Storage(e.to_string()))?;

        debug!(%key, removed, "lease released");
        Ok(removed)
    }

    fn next_token(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}", self.manager_id, n)
    }
}

/// A held lease. `release` is idempotent; dropping an unreleased guard
/// releases best-effort, so no code path leaks a lock. If the process
/// dies outright, the lease expires on its own.
pub struct LockGuard {
    manager: LockManager,
    key: String,
    token: String,
    released: AtomicBool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lease. Safe to call repeatedly or after expiry.
    pub fn release(&self) -> LockResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.manager.release_token(&self.key, &self.token)?;
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst)
            && let Err(e) = self.manager.release_token(&self.key, &self.token)
        {
            warn!(key = %self.key, error = %e, "failed to release lease on drop");
        }
    }
}

/// Process-unique manager identity, so tokens from different scheduler
/// instances never collide.
fn generate_manager_id() -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::process::id().hash(&mut hasher);
    epoch_ms().hash(&mut hasher);
    format!("lm-{:08x}", hasher.finish() as u32)
}

/// Current Unix epoch in milliseconds.
fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
