//! Redis lock store
//!
//! Acquisition is a single `SET key token NX EX seconds`. Release runs the
//! compare-and-delete script server-side so no other client can slip in between
//! the ownership check and the delete. Requires the `redis` feature.

use crate::error::LockResult;
use crate::script::release_script;
use crate::stores::LockStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, trace};

/// Redis-backed lock store
///
/// The connection manager is injected by the caller and cloned per command.
pub struct RedisStore {
    /// Redis connection manager
    conn: ConnectionManager,
    /// Compare-and-delete script (hash computed once)
    release: redis::Script,
}

impl RedisStore {
    /// Create a store over an existing connection manager
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use armature_lock::RedisStore;
    ///
    /// let client = redis::Client::open("redis://127.0.0.1/")?;
    /// let conn = client.get_connection_manager().await?;
    /// let store = RedisStore::new(conn);
    /// ```
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release: release_script(),
        }
    }

    /// Connect to Redis and create a store
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(url: &str) -> LockResult<Self> {
        debug!(url = %url, "Connecting to Redis for distributed locks");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self::new(conn))
    }
}

/// Whole seconds for `EX`, rounded up and never zero
fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let secs = expiry_secs(ttl);

        // SET NX EX replies OK on creation and nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await?;

        trace!(key = %key, ttl_secs = secs, created = reply.is_some(), "Redis conditional set");
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> LockResult<bool> {
        let mut conn = self.conn.clone();

        let removed: i64 = self
            .release
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;

        trace!(key = %key, removed = removed, "Redis compare-and-delete");
        Ok(removed == 1)
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}
