//! Retrying coordination calls.
//!
//! Transient unavailability of the coordination service is retried with
//! exponential backoff and jitter. Anything still failing after the last
//! attempt is surfaced, and workers treat it as fatal.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{RetryCounterStore, VersionedCount};
use crate::config::CoordinationConfig;
use crate::errors::CoordinationError;

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&CoordinationConfig::default())
    }
}

impl From<&CoordinationConfig> for BackoffPolicy {
    fn from(config: &CoordinationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: if config.jitter {
                JitterStrategy::Full
            } else {
                JitterStrategy::None
            },
        }
    }
}

impl BackoffPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: JitterStrategy::None,
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (zero based): `base * 2^retry`,
    /// capped and jittered.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(2u64.saturating_pow(retry)).min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };
        Duration::from_millis(jittered)
    }
}

/// Runs `operation`, retrying transient coordination errors.
pub async fn with_retry<T, F, Fut>(
    policy: &BackoffPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, CoordinationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoordinationError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt - 1);
                warn!(
                    operation = what,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying coordination call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wraps a store so that every call is retried under a [`BackoffPolicy`].
#[derive(Debug)]
pub struct RetryingCounterStore<S> {
    inner: S,
    policy: BackoffPolicy,
}

impl<S: RetryCounterStore> RetryingCounterStore<S> {
    /// Creates a new retrying store.
    pub const fn new(inner: S, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RetryCounterStore> RetryCounterStore for RetryingCounterStore<S> {
    async fn get(&self, key: &str) -> Result<VersionedCount, CoordinationError> {
        with_retry(&self.policy, "get", || self.inner.get(key)).await
    }

    async fn try_set(&self, key: &str, expected_version: u64, value: u64) -> Result<bool, CoordinationError> {
        with_retry(&self.policy, "try_set", || self.inner.try_set(key, expected_version, value)).await
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        with_retry(&self.policy, "delete", || self.inner.delete(key)).await
    }

    async fn increment(&self, key: &str) -> Result<u64, CoordinationError> {
        with_retry(&self.policy, "increment", || self.inner.increment(key)).await
    }
}
