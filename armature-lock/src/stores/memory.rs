//! In-memory lock store
//!
//! Uses DashMap for thread-safe concurrent access. Each key's entry lock makes
//! the conditional set and the compare-and-delete atomic. Expiry is applied lazily
//! on access against the tokio clock, so paused-time tests can move it forward.

use crate::error::LockResult;
use crate::stores::LockStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory lock store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory lock store");
        Self {
            entries: DashMap::new(),
        }
    }

    /// Unconditionally write `key -> value`, replacing any holder.
    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(key.to_string(), StoredValue::new(value, ttl));
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, v| !v.is_expired(now));
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();

        let created = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredValue::new(token, ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(token, ttl));
                true
            }
        };

        trace!(key = %key, created = created, "Memory conditional set");
        Ok(created)
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> LockResult<bool> {
        let now = Instant::now();
        // Expired entries are evicted too, but only a live match counts as removed
        let removed = self
            .entries
            .remove_if(key, |_, v| v.is_expired(now) || v.value == token)
            .is_some_and(|(_, v)| !v.is_expired(now));

        trace!(key = %key, removed = removed, "Memory compare-and-delete");
        Ok(removed)
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let now = Instant::now();
        if self.entries.remove_if(key, |_, v| v.is_expired(now)).is_some() {
            trace!(key = %key, "Evicted expired entry");
            return Ok(None);
        }
        Ok(self
            .entries
            .get(key)
            .and_then(|v| (!v.is_expired(now)).then(|| v.value.clone())))
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
