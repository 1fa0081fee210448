//! Acquisition strategies
//!
//! A strategy decides what `lock()` does while the key is held by someone else.
//! Every strategy races its sleeps against a [`CancellationToken`], so a blocked
//! acquisition can be abandoned promptly rather than at the next retry.

use crate::backoff::{BackoffPolicy, JitteredBackoff};
use crate::error::{LockError, LockResult};
use crate::stores::LockStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Policy driving the conditional-set primitive until it succeeds or gives up
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    /// Try to create `key -> token` with expiry `ttl`.
    ///
    /// Returns `Ok(true)` once acquired and `Ok(false)` when the strategy gives up.
    /// Store errors and cancellation abort immediately.
    async fn acquire(
        &self,
        store: &dyn LockStore,
        key: &str,
        token: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> LockResult<bool>;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

/// Sleep for `delay` unless cancelled first
async fn pause(delay: Duration, cancel: &CancellationToken) -> LockResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LockError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// One conditional set, checking for cancellation first
async fn attempt(
    store: &dyn LockStore,
    key: &str,
    token: &str,
    ttl: Duration,
    cancel: &CancellationToken,
) -> LockResult<bool> {
    if cancel.is_cancelled() {
        return Err(LockError::Cancelled);
    }
    store.set_if_absent(key, token, ttl).await
}

fn default_backoff() -> Arc<dyn BackoffPolicy> {
    Arc::new(JitteredBackoff::default())
}

/// Spin until acquired, with no upper bound on attempts.
///
/// Never returns `Ok(false)`: a caller waiting here is unblocked by the holder
/// releasing, the holder's TTL running out, or cancellation.
#[derive(Debug, Clone)]
pub struct BlockingSpin {
    backoff: Arc<dyn BackoffPolicy>,
}

impl BlockingSpin {
    /// Create a blocking strategy with the default jittered backoff
    pub fn new() -> Self {
        Self {
            backoff: default_backoff(),
        }
    }

    /// Use a different backoff policy
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for BlockingSpin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcquisitionStrategy for BlockingSpin {
    async fn acquire(
        &self,
        store: &dyn LockStore,
        key: &str,
        token: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> LockResult<bool> {
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            if attempt(store, key, token, ttl, cancel).await? {
                debug!(key = %key, attempts = attempts, "Blocking acquisition succeeded");
                return Ok(true);
            }

            let delay = self.backoff.delay(attempts);
            trace!(key = %key, attempts = attempts, delay = ?delay, "Lock held, retrying");
            pause(delay, cancel).await?;
        }
    }

    fn name(&self) -> &'static str {
        "blocking"
    }
}

/// Spin until acquired or until `timeout` has elapsed.
#[derive(Debug, Clone)]
pub struct BoundedSpin {
    backoff: Arc<dyn BackoffPolicy>,
    timeout: Duration,
}

impl BoundedSpin {
    /// Create a bounded strategy with the default jittered backoff
    pub fn new(timeout: Duration) -> Self {
        Self {
            backoff: default_backoff(),
            timeout,
        }
    }

    /// Use a different backoff policy
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Acquisition deadline relative to the first attempt
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl AcquisitionStrategy for BoundedSpin {
    async fn acquire(
        &self,
        store: &dyn LockStore,
        key: &str,
        token: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> LockResult<bool> {
        let deadline = Instant::now() + self.timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            if attempt(store, key, token, ttl, cancel).await? {
                debug!(key = %key, attempts = attempts, "Bounded acquisition succeeded");
                return Ok(true);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(key = %key, attempts = attempts, timeout = ?self.timeout, "Acquisition timed out");
                return Ok(false);
            }

            let delay = self.backoff.delay(attempts).min(remaining);
            trace!(key = %key, attempts = attempts, delay = ?delay, "Lock held, retrying");
            pause(delay, cancel).await?;
        }
    }

    fn name(&self) -> &'static str {
        "bounded"
    }
}

/// A single attempt that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TryOnce;

#[async_trait]
impl AcquisitionStrategy for TryOnce {
    async fn acquire(
        &self,
        store: &dyn LockStore,
        key: &str,
        token: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> LockResult<bool> {
        attempt(store, key, token, ttl, cancel).await
    }

    fn name(&self) -> &'static str {
        "try-once"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::FixedBackoff;
    use crate::stores::MemoryStore;

    const TTL: Duration = Duration::from_secs(10);

    fn fixed(ms: u64) -> Arc<dyn BackoffPolicy> {
        Arc::new(FixedBackoff(Duration::from_millis(ms)))
    }

    #[tokio::test]
    async fn test_try_once() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();

        assert!(TryOnce.acquire(&store, "k_lock", "a", TTL, &cancel).await.unwrap());
        assert!(!TryOnce.acquire(&store, "k_lock", "b", TTL, &cancel).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_gives_up_at_deadline() {
        let store = MemoryStore::new();
        store.set("k_lock", "holder", TTL);
        let cancel = CancellationToken::new();
        let strategy = BoundedSpin::new(Duration::from_millis(200)).with_backoff(fixed(30));

        let start = Instant::now();
        let acquired = strategy.acquire(&store, "k_lock", "a", TTL, &cancel).await.unwrap();

        assert!(!acquired);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(store.get("k_lock").await.unwrap().as_deref(), Some("holder"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_waits_for_expiry() {
        let store = MemoryStore::new();
        store.set("k_lock", "holder", Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let strategy = BlockingSpin::new().with_backoff(fixed(10));

        let start = Instant::now();
        assert!(strategy.acquire(&store, "k_lock", "a", TTL, &cancel).await.unwrap());
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(store.get("k_lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff_sleep() {
        let store = MemoryStore::new();
        store.set("k_lock", "holder", TTL);
        let cancel = CancellationToken::new();
        // One long sleep; cancellation must not wait for it to finish
        let strategy = BlockingSpin::new().with_backoff(fixed(60_000));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = strategy
            .acquire(&store, "k_lock", "a", TTL, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = TryOnce.acquire(&store, "k_lock", "a", TTL, &cancel).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled));
        assert!(store.get("k_lock").await.unwrap().is_none());
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(BlockingSpin::new().name(), "blocking");
        assert_eq!(BoundedSpin::new(Duration::from_secs(1)).name(), "bounded");
        assert_eq!(TryOnce.name(), "try-once");
    }
}
