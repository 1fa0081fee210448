//! Lock handles
//!
//! A [`LockHandle`] owns one lock identity: the namespaced key, the token of its
//! current acquisition, the TTL and a cached locked flag. It is meant to be used
//! by a single code path and is not shared between tasks.

use crate::backoff::BackoffPolicy;
use crate::config::{DEFAULT_TTL, KEY_SUFFIX, LockConfig};
use crate::error::{LockError, LockResult, ScopeError};
use crate::strategy::{AcquisitionStrategy, BlockingSpin, BoundedSpin};
use crate::stores::LockStore;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Token-fenced distributed lock
///
/// ```text
/// UNLOCKED --lock() ok--> LOCKED --unlock() (any answer)--> UNLOCKED
/// ```
///
/// Expiry of the key is invisible to the handle until a release reports that
/// the key no longer carries this handle's token.
pub struct LockHandle {
    key: String,
    token: Option<String>,
    ttl: Duration,
    locked: bool,
    store: Arc<dyn LockStore>,
    strategy: Arc<dyn AcquisitionStrategy>,
    cancel: CancellationToken,
}

impl LockHandle {
    /// Create a handle for `name` with a 30 second TTL and a blocking strategy.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use armature_lock::{LockHandle, RedisStore};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await?);
    /// let mut lock = LockHandle::new("order-42", store);
    /// if lock.lock().await? {
    ///     // critical section
    ///     lock.unlock().await?;
    /// }
    /// ```
    pub fn new(name: &str, store: Arc<dyn LockStore>) -> Self {
        Self {
            key: format!("{}{}", name, KEY_SUFFIX),
            token: None,
            ttl: DEFAULT_TTL,
            locked: false,
            store,
            strategy: Arc::new(BlockingSpin::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the key TTL. Must be non-zero; `lock()` rejects a zero TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the acquisition strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn AcquisitionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Abort pending acquisitions when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Namespaced store key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token of the most recent acquisition attempt
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Key TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached lock state. Not re-checked against the store, so it stays `true`
    /// after the key has expired until `unlock()` is called.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Acquire the lock using the configured strategy.
    ///
    /// Generates a fresh token on every call. Returns `Ok(false)` only when the
    /// strategy gave up (bounded or single-attempt strategies).
    pub async fn lock(&mut self) -> LockResult<bool> {
        if self.locked {
            return Err(LockError::AlreadyHeld {
                key: self.key.clone(),
            });
        }
        if self.ttl.is_zero() {
            return Err(LockError::config("ttl must be positive"));
        }

        let token = Uuid::new_v4().to_string();
        let acquired = self
            .strategy
            .acquire(self.store.as_ref(), &self.key, &token, self.ttl, &self.cancel)
            .await;
        self.token = Some(token);

        match acquired {
            Ok(true) => {
                self.locked = true;
                info!(key = %self.key, ttl = ?self.ttl, strategy = self.strategy.name(), "Acquired lock");
                Ok(true)
            }
            Ok(false) => {
                debug!(key = %self.key, strategy = self.strategy.name(), "Failed to acquire lock");
                Ok(false)
            }
            Err(LockError::Cancelled) => {
                warn!(key = %self.key, "Lock acquisition cancelled");
                Err(LockError::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    /// Release the lock if this handle still owns it.
    ///
    /// Returns `Ok(true)` without touching the store when the handle is not
    /// locked. Otherwise returns whether the key was deleted; `Ok(false)` means
    /// the key had expired or changed hands, and work done under the lock may
    /// have overlapped with another holder. The handle is unlocked after any
    /// answer from the store.
    ///
    /// A store error is the one case where the handle stays locked after
    /// `unlock()`: the key may still carry our token, so `is_locked()` keeps
    /// returning `true` and the caller may retry the release.
    pub async fn unlock(&mut self) -> LockResult<bool> {
        let token = match (self.locked, self.token.as_deref()) {
            (true, Some(token)) => token,
            _ => {
                trace!(key = %self.key, "Unlock on unlocked handle");
                self.locked = false;
                return Ok(true);
            }
        };

        let released = self.store.compare_and_delete(&self.key, token).await?;
        self.locked = false;

        if released {
            debug!(key = %self.key, "Released lock");
        } else {
            warn!(key = %self.key, "Failed to release lock (expired or taken over)");
        }
        Ok(released)
    }

    /// Re-read the store and check the key still carries this handle's token.
    ///
    /// Diagnostic only: the answer can be stale as soon as it is returned.
    pub async fn owns_key(&self) -> LockResult<bool> {
        let Some(token) = self.token.as_deref().filter(|_| self.locked) else {
            return Ok(false);
        };
        let current = self.store.get(&self.key).await?;
        Ok(current.as_deref() == Some(token))
    }

    /// Run `section` while holding the lock, releasing it on every exit path.
    ///
    /// The lock is released after the section returns `Ok`, returns `Err`, or
    /// panics (the panic is resumed afterwards). A release that finds the key
    /// gone or re-owned is reported as [`ScopeError::Release`], which also
    /// carries the section's own error when there was one.
    pub async fn with_lock<F, Fut, T, E>(&mut self, section: F) -> Result<T, ScopeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.lock().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ScopeError::NotAcquired {
                    key: self.key.clone(),
                });
            }
            Err(e) => return Err(ScopeError::Acquire(e)),
        }

        let outcome = AssertUnwindSafe(async move { section().await })
            .catch_unwind()
            .await;
        let released = self.release_scoped().await;

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                if let Err(e) = released {
                    error!(key = %self.key, error = %e, "Lock release failed after panic in critical section");
                }
                std::panic::resume_unwind(panic);
            }
        };

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Ok(())) => Err(ScopeError::Section(e)),
            (result, Err(source)) => {
                error!(key = %self.key, error = %source, "Scoped lock release failed");
                Err(ScopeError::Release {
                    source,
                    section: result.err(),
                })
            }
        }
    }

    async fn release_scoped(&mut self) -> LockResult<()> {
        if self.locked && !self.unlock().await? {
            return Err(LockError::ReleaseFailed {
                key: self.key.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("locked", &self.locked)
            .field("store", &self.store.store_type())
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if !self.locked {
            return;
        }
        let Some(token) = self.token.take() else {
            return;
        };

        let key = self.key.clone();
        let store = self.store.clone();

        // Best effort release on drop
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(key = %key, "Lock handle dropped while locked, releasing in background");
                runtime.spawn(async move {
                    match store.compare_and_delete(&key, &token).await {
                        Ok(true) => debug!(key = %key, "Released lock on drop"),
                        Ok(false) => warn!(key = %key, "Lock already expired or taken over at drop"),
                        Err(e) => warn!(key = %key, error = %e, "Failed to release lock on drop"),
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "Lock handle dropped outside a runtime, key will expire after its TTL");
            }
        }
    }
}

/// Lock handle builder
pub struct LockBuilder {
    name: String,
    config: LockConfig,
    backoff: Option<Arc<dyn BackoffPolicy>>,
    strategy: Option<Arc<dyn AcquisitionStrategy>>,
    cancel: Option<CancellationToken>,
}

impl LockBuilder {
    /// Create new lock builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: LockConfig::default(),
            backoff: None,
            strategy: None,
            cancel: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    /// Set TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Give up acquiring after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = Some(timeout);
        self
    }

    /// Use a custom backoff policy for the spinning strategies
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Use an explicit strategy, overriding timeout and backoff settings
    pub fn with_strategy(mut self, strategy: Arc<dyn AcquisitionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Abort pending acquisitions when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build the handle
    pub fn build(self, store: Arc<dyn LockStore>) -> LockResult<LockHandle> {
        self.config.validate()?;

        let strategy: Arc<dyn AcquisitionStrategy> = match (self.strategy, self.backoff) {
            (Some(strategy), _) => strategy,
            (None, Some(backoff)) => match self.config.acquisition_timeout {
                Some(timeout) => Arc::new(BoundedSpin::new(timeout).with_backoff(backoff)),
                None => Arc::new(BlockingSpin::new().with_backoff(backoff)),
            },
            (None, None) => self.config.strategy(),
        };

        Ok(LockHandle {
            key: self.config.lock_key(&self.name),
            token: None,
            ttl: self.config.ttl,
            locked: false,
            store,
            strategy,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
