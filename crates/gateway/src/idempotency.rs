//! Idempotency coordination for event submissions.
//!
//! Owns the mapping from client-supplied idempotency key to the exact
//! response previously returned for that key. Two pieces:
//! - An injected [`IdempotencyStore`] capability (get / put-with-TTL) so
//!   tests and alternate backends can substitute implementations.
//! - A per-key asynchronous critical section: only one in-flight request
//!   per key performs the forward; concurrent duplicates wait on the key's
//!   lock and then hit the stored response instead of forwarding again.
//!
//! Store failures are surfaced as `CacheBackendUnavailable`, never conflated
//! with "no cached entry". The caller fails closed on lookup errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use proofpulse_core::GatewayError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

/// Namespace prefix so idempotency entries cannot collide with unrelated
/// cache keys in a shared store.
const KEY_PREFIX: &str = "idem:";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),
}

/// The exact response previously produced for an idempotency key.
/// `body` is the raw serialized JSON so replays are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: String,
}

/// Key/value capability backing the coordinator. Entries expire after the
/// supplied TTL; there is no explicit deletion path.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredResponse>, StoreError>;

    async fn put(
        &self,
        key: &str,
        response: StoredResponse,
        ttl: Duration,
    ) -> Result<(), StoreError>;
}

/// In-memory TTL store. Expired entries are evicted lazily on lookup.
///
/// Per-process only: if the process restarts the records are lost and a
/// replay may reach the ledger again, where the duplicate-eventId check is
/// the backstop.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (StoredResponse, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredResponse>, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((response, expires_at)) if *expires_at > Instant::now() => {
                Ok(Some(response.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        response: StoredResponse,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (response, Instant::now() + ttl));
        Ok(())
    }
}

type LockTable = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Decides whether an incoming request is a replay and serializes
/// concurrent requests bearing the same key.
pub struct IdempotencyCoordinator {
    store: Arc<dyn IdempotencyStore>,
    locks: LockTable,
    ttl: Duration,
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Normalize a raw `Idempotency-Key` header value into a namespaced
    /// cache key. Whitespace-only or absent values are a client error.
    pub fn derive_key(&self, header_value: Option<&str>) -> Result<String, GatewayError> {
        let key = header_value.unwrap_or("").trim();
        if key.is_empty() {
            return Err(GatewayError::MissingIdempotencyKey);
        }
        Ok(format!("{}{}", KEY_PREFIX, key))
    }

    /// Enter the per-key critical section. The returned guard releases the
    /// key on drop (every exit path), and the lock table entry is reclaimed
    /// once the last holder is gone.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let entry = {
            let mut table = self.locks.lock().unwrap();
            Arc::clone(
                table
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let permit = entry.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
            permit: Some(permit),
        }
    }

    /// Previously stored response for `key`, if present and unexpired.
    pub async fn lookup(&self, key: &str) -> Result<Option<StoredResponse>, GatewayError> {
        self.store
            .get(key)
            .await
            .map_err(|e| GatewayError::CacheBackendUnavailable {
                detail: e.to_string(),
            })
    }

    /// Persist the response under `key` with the configured TTL. Only called
    /// for accepted submissions; failures are never cached.
    pub async fn store(&self, key: &str, response: StoredResponse) -> Result<(), GatewayError> {
        self.store
            .put(key, response, self.ttl)
            .await
            .map_err(|e| GatewayError::CacheBackendUnavailable {
                detail: e.to_string(),
            })
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// RAII holder of a per-key critical section.
pub struct KeyGuard {
    key: String,
    locks: LockTable,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release the permit and reclaim the table entry atomically with
        // respect to acquire(): clones only happen under the table lock, so
        // strong_count == 1 here means no waiter can still reach this mutex.
        let mut table = self.locks.lock().unwrap();
        drop(self.permit.take());
        if let Some(entry) = table.get(&self.key) {
            if Arc::strong_count(entry) == 1 {
                table.remove(&self.key);
            }
        }
    }
}
