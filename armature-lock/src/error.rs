//! Error types for distributed locking

use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Distributed lock errors
///
/// Contention and a release that finds someone else's token are *not* errors:
/// they surface as `Ok(false)` from [`LockHandle::lock`](crate::LockHandle::lock)
/// and [`LockHandle::unlock`](crate::LockHandle::unlock).
#[derive(Debug, Error)]
pub enum LockError {
    /// Store communication failed; the effect of the command is unknown
    #[error("Lock store error: {0}")]
    Store(String),

    /// Redis connection or protocol error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Acquisition was cancelled while waiting
    #[error("Lock acquisition cancelled")]
    Cancelled,

    /// `lock()` was called on a handle that already holds the lock
    #[error("Lock already held by this handle: {key}")]
    AlreadyHeld { key: String },

    /// A scoped release found the key missing or owned by another token
    #[error("Failed to release lock: {key}")]
    ReleaseFailed { key: String },

    /// Invalid lock configuration
    #[error("Lock configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error came from the backing store.
    ///
    /// The lock layer never retries these itself.
    pub fn is_store_error(&self) -> bool {
        match self {
            Self::Store(_) => true,
            #[cfg(feature = "redis")]
            Self::Redis(_) => true,
            _ => false,
        }
    }

    /// Check if acquisition was abandoned through cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Outcome of a failed scoped acquisition ([`LockHandle::with_lock`](crate::LockHandle::with_lock))
#[derive(Debug, Error)]
pub enum ScopeError<E> {
    /// The strategy gave up without acquiring (bounded or single-attempt strategies)
    #[error("Lock not acquired: {key}")]
    NotAcquired { key: String },

    /// Acquisition failed with a store error or was cancelled
    #[error("Failed to acquire lock: {0}")]
    Acquire(#[source] LockError),

    /// The critical section failed; the lock was released cleanly
    #[error("Critical section failed: {0}")]
    Section(E),

    /// Releasing the lock failed. `section` carries the critical section's own
    /// error when it failed too.
    #[error("Lock release failed: {source}")]
    Release {
        #[source]
        source: LockError,
        section: Option<E>,
    },
}

impl<E> ScopeError<E> {
    /// Check if the lock release itself failed
    pub fn is_release_failure(&self) -> bool {
        matches!(self, Self::Release { .. })
    }

    /// Take the critical section's error, if there was one
    pub fn into_section_error(self) -> Option<E> {
        match self {
            Self::Section(e) => Some(e),
            Self::Release { section, .. } => section,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(LockError::store("connection reset").is_store_error());
        assert!(!LockError::Cancelled.is_store_error());
        assert!(LockError::Cancelled.is_cancelled());
        assert!(!LockError::config("bad ttl").is_cancelled());
    }

    #[test]
    fn test_scope_error_keeps_section_error() {
        let err: ScopeError<String> = ScopeError::Release {
            source: LockError::ReleaseFailed {
                key: "order-42_lock".to_string(),
            },
            section: Some("write failed".to_string()),
        };

        assert!(err.is_release_failure());
        assert_eq!(err.to_string(), "Lock release failed: Failed to release lock: order-42_lock");
        assert_eq!(err.into_section_error().as_deref(), Some("write failed"));
    }
}
