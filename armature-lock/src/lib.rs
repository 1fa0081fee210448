//! Distributed Locks for Armature
//!
//! Mutual exclusion for processes that share no memory but share a single
//! key-value coordinator (Redis). Clients race to create a uniquely tokened key
//! with an expiry, and release it only while it still carries their token.
//!
//! ## Features
//!
//! - **Fencing tokens** - A fresh UUID per acquisition; a stale holder can never
//!   delete a newer holder's key
//! - **Atomic release** - Compare-and-delete runs as one server-side script
//! - **Pluggable strategies** - Blocking spin, bounded spin, or a single attempt
//! - **Cancellable waits** - Backoff sleeps race a `CancellationToken`
//! - **Scoped acquisition** - `with_lock` releases on every exit path and
//!   reports release failures separately
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_lock::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await?);
//!
//!     let mut lock = LockBuilder::new("order-42")
//!         .with_ttl(Duration::from_secs(5))
//!         .with_timeout(Duration::from_millis(200))
//!         .build(store)?;
//!
//!     if lock.lock().await? {
//!         // Critical section
//!         if !lock.unlock().await? {
//!             // The key expired or changed hands before release
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Scoped Acquisition
//!
//! ```rust,ignore
//! let mut lock = LockHandle::new("order-42", store);
//!
//! match lock.with_lock(|| async { process_order().await }).await {
//!     Ok(receipt) => println!("processed: {receipt:?}"),
//!     Err(ScopeError::Release { source, .. }) => {
//!         // Exclusive access was not guaranteed for the whole section
//!         eprintln!("release failed: {source}");
//!     }
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```
//!
//! ## Guarantees
//!
//! Exclusivity holds only while the coordinator does not fail over and the TTL
//! outlives the critical section. There is no lease renewal, no quorum across
//! several coordinators, and no fairness among waiting clients.

pub mod backoff;
pub mod config;
pub mod error;
pub mod handle;
pub mod script;
pub mod strategy;
pub mod stores;

pub use backoff::{BackoffPolicy, FixedBackoff, JitteredBackoff};
pub use config::{KEY_SUFFIX, LockConfig, LockConfigBuilder};
pub use error::{LockError, LockResult, ScopeError};
pub use handle::{LockBuilder, LockHandle};
pub use script::{RELEASE_SCRIPT, RELEASE_SCRIPT_VERSION};
pub use strategy::{AcquisitionStrategy, BlockingSpin, BoundedSpin, TryOnce};
#[cfg(feature = "redis")]
pub use stores::RedisStore;
pub use stores::{LockStore, MemoryStore};

// Re-exported so callers can build cancellation tokens without a direct dependency
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
///
/// ```
/// use armature_lock::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::{BackoffPolicy, JitteredBackoff};
    pub use crate::config::LockConfig;
    pub use crate::error::{LockError, LockResult, ScopeError};
    pub use crate::handle::{LockBuilder, LockHandle};
    pub use crate::strategy::{AcquisitionStrategy, BlockingSpin, BoundedSpin, TryOnce};
    #[cfg(feature = "redis")]
    pub use crate::stores::RedisStore;
    pub use crate::stores::{LockStore, MemoryStore};
    pub use tokio_util::sync::CancellationToken;
}
