//! Retry delays for spinning acquisition strategies

use rand::Rng;
use std::fmt::Debug;
use std::time::Duration;

/// Default base delay between acquisition attempts
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Default upper bound for the random component of the delay
pub const DEFAULT_BACKOFF_JITTER: Duration = Duration::from_millis(10);

/// Policy deciding how long a strategy waits before the next attempt
pub trait BackoffPolicy: Debug + Send + Sync {
    /// Delay to wait after failed attempt number `attempt` (starting at 1)
    fn delay(&self, attempt: u32) -> Duration;
}

/// Fixed base delay plus uniform random jitter.
///
/// The jitter desynchronizes competing clients so they do not retry in lockstep.
/// It is clamped to the base, keeping the random component strictly below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitteredBackoff {
    base: Duration,
    jitter: Duration,
}

impl JitteredBackoff {
    /// Create a new jittered backoff
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self {
            base,
            jitter: jitter.min(base),
        }
    }

    /// Base delay
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Effective jitter bound (exclusive)
    pub fn jitter(&self) -> Duration {
        self.jitter
    }
}

impl Default for JitteredBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_JITTER)
    }
}

impl BackoffPolicy for JitteredBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        let bound = self.jitter.as_micros() as u64;
        if bound == 0 {
            return self.base;
        }
        let extra = rand::rng().random_range(0..bound);
        self.base + Duration::from_micros(extra)
    }
}

/// Constant delay with no jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff(pub Duration);

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}
