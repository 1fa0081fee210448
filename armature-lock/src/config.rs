//! Lock configuration

use crate::backoff::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_JITTER, JitteredBackoff};
use crate::error::{LockError, LockResult};
use crate::strategy::{AcquisitionStrategy, BlockingSpin, BoundedSpin};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Suffix appended to every lock name to keep lock keys apart from other data
pub const KEY_SUFFIX: &str = "_lock";

/// Default lifetime of a lock key
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Lock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime granted to the key before the store expires it.
    #[serde(with = "secs")]
    pub ttl: Duration,
    /// Give up acquiring after this long. `None` spins until acquired.
    #[serde(with = "opt_millis")]
    pub acquisition_timeout: Option<Duration>,
    /// Base delay between attempts.
    #[serde(with = "millis")]
    pub backoff_base: Duration,
    /// Random jitter added to each delay (clamped to the base).
    #[serde(with = "millis")]
    pub backoff_jitter: Duration,
    /// Suffix appended to lock names.
    pub key_suffix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            acquisition_timeout: None,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
            key_suffix: KEY_SUFFIX.to_string(),
        }
    }
}

impl LockConfig {
    /// Create a builder.
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> LockConfigBuilder {
        let mut builder = LockConfigBuilder::new();

        if let Ok(ttl) = std::env::var("LOCK_TTL_SECONDS")
            && let Ok(secs) = ttl.parse() {
                builder = builder.ttl(Duration::from_secs(secs));
            }

        if let Ok(timeout) = std::env::var("LOCK_ACQUIRE_TIMEOUT_MS")
            && let Ok(ms) = timeout.parse() {
                builder = builder.acquisition_timeout(Duration::from_millis(ms));
            }

        if let Ok(base) = std::env::var("LOCK_BACKOFF_BASE_MS")
            && let Ok(ms) = base.parse() {
                builder = builder.backoff_base(Duration::from_millis(ms));
            }

        if let Ok(jitter) = std::env::var("LOCK_BACKOFF_JITTER_MS")
            && let Ok(ms) = jitter.parse() {
                builder = builder.backoff_jitter(Duration::from_millis(ms));
            }

        if let Ok(suffix) = std::env::var("LOCK_KEY_SUFFIX") {
            builder = builder.key_suffix(suffix);
        }

        builder
    }

    /// Check the configuration for values the store cannot honour.
    pub fn validate(&self) -> LockResult<()> {
        if self.ttl.is_zero() {
            return Err(LockError::config("ttl must be positive"));
        }
        if self.key_suffix.is_empty() {
            return Err(LockError::config("key suffix must not be empty"));
        }
        if self.backoff_base.is_zero() {
            return Err(LockError::config("backoff base must be positive"));
        }
        if self.acquisition_timeout.is_some_and(|t| t.is_zero()) {
            return Err(LockError::config("acquisition timeout must be positive"));
        }
        Ok(())
    }

    /// Namespaced store key for a lock name.
    pub fn lock_key(&self, name: &str) -> String {
        format!("{}{}", name, self.key_suffix)
    }

    /// Backoff policy described by this configuration.
    pub fn backoff(&self) -> JitteredBackoff {
        JitteredBackoff::new(self.backoff_base, self.backoff_jitter)
    }

    /// Strategy described by this configuration: bounded when a timeout is set,
    /// blocking otherwise.
    pub fn strategy(&self) -> Arc<dyn AcquisitionStrategy> {
        let backoff = Arc::new(self.backoff());
        match self.acquisition_timeout {
            Some(timeout) => Arc::new(BoundedSpin::new(timeout).with_backoff(backoff)),
            None => Arc::new(BlockingSpin::new().with_backoff(backoff)),
        }
    }
}

/// Builder for lock configuration.
#[derive(Default)]
pub struct LockConfigBuilder {
    config: LockConfig,
}

impl LockConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: LockConfig::default(),
        }
    }

    /// Set the key TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set the acquisition timeout.
    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = Some(timeout);
        self
    }

    /// Set the base backoff delay.
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.config.backoff_base = base;
        self
    }

    /// Set the backoff jitter.
    pub fn backoff_jitter(mut self, jitter: Duration) -> Self {
        self.config.backoff_jitter = jitter;
        self
    }

    /// Set the key suffix.
    pub fn key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.key_suffix = suffix.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LockConfig {
        self.config
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LockConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(30));
        assert_eq!(config.acquisition_timeout, None);
        assert_eq!(config.backoff_base, Duration::from_millis(10));
        assert_eq!(config.lock_key("order-42"), "order-42_lock");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = LockConfig::builder().ttl(Duration::ZERO).build();
        assert!(matches!(config.validate(), Err(LockError::Config(_))));

        let config = LockConfig::builder().key_suffix("").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_backoff_base() {
        let config = LockConfig::builder()
            .backoff_base(Duration::ZERO)
            .backoff_jitter(Duration::from_millis(10))
            .build();
        assert!(matches!(config.validate(), Err(LockError::Config(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LockConfig =
            serde_json::from_str(r#"{"ttl": 5, "acquisition_timeout": 200}"#).unwrap();

        assert_eq!(config.ttl, Duration::from_secs(5));
        assert_eq!(config.acquisition_timeout, Some(Duration::from_millis(200)));
        assert_eq!(config.backoff_jitter, Duration::from_millis(10));
        assert_eq!(config.key_suffix, "_lock");
    }

    #[test]
    fn test_serialize_units() {
        let config = LockConfig::builder()
            .ttl(Duration::from_secs(12))
            .backoff_base(Duration::from_millis(20))
            .build();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["ttl"], 12);
        assert_eq!(json["backoff_base"], 20);
        assert!(json["acquisition_timeout"].is_null());
    }

    #[test]
    fn test_backoff_from_config() {
        let config = LockConfig::builder()
            .backoff_base(Duration::from_millis(10))
            .backoff_jitter(Duration::from_millis(50))
            .build();

        assert_eq!(config.backoff().jitter(), Duration::from_millis(10));
    }
}
