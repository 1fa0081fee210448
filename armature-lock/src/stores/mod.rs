//! Lock storage backends
//!
//! A lock store is the shared coordinator every competing client talks to.
//! The lock layer only ever mutates it through two atomic primitives:
//!
//! - **Conditional set**: create the key with an expiry only if it is absent
//! - **Compare-and-delete**: remove the key only if it still holds our token
//!
//! Backends:
//!
//! - **Memory**: In-process store using DashMap (single process, testing)
//! - **Redis**: `SET NX EX` plus a server-side release script

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

use crate::error::LockResult;
use async_trait::async_trait;
use std::time::Duration;

/// Key-value capability consumed by lock handles
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key -> token` with the given expiry if `key` does not exist.
    /// Returns true iff this call created the key.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool>;

    /// Atomically delete `key` if its current value equals `token`.
    /// Returns true iff the key was removed.
    async fn compare_and_delete(&self, key: &str, token: &str) -> LockResult<bool>;

    /// Read the current value of `key`
    async fn get(&self, key: &str) -> LockResult<Option<String>>;

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
