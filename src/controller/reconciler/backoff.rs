//! # Requeue Backoff
//!
//! Exponential requeue delays tracked per custom resource key.
//!
//! The first retry waits the configured base delay; each consecutive failure
//! doubles it until the configured maximum. A pass that converges resets the
//! key so the next incident starts again from the base delay.

use crate::config::{ConfigError, ConfigStore};
use crate::constants::{self, keys};
use std::time::Duration;

/// Exponential backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(constants::DEFAULT_REQUEUE_BASE_DELAY_SECS),
            Duration::from_secs(constants::DEFAULT_REQUEUE_MAX_DELAY_SECS),
        )
    }
}

impl ExponentialBackoff {
    /// A maximum below `base` is raised to `base`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Bounds from `reconciliation-requeue-base-delay` and
    /// `reconciliation-requeue-max-delay` (seconds)
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        let base = seconds(
            store,
            keys::REQUEUE_BASE_DELAY,
            constants::DEFAULT_REQUEUE_BASE_DELAY_SECS,
        )?;
        let max = seconds(
            store,
            keys::REQUEUE_MAX_DELAY,
            constants::DEFAULT_REQUEUE_MAX_DELAY_SECS,
        )?;
        Ok(Self::new(base, max))
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        // 2^31 already saturates any sane maximum
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

fn seconds(store: &ConfigStore, key: &str, default: u64) -> Result<Duration, ConfigError> {
    let value = store.get_int_or(key, i64::try_from(default).unwrap_or(i64::MAX))?;
    let secs = u64::try_from(value).map_err(|_negative| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a non-negative number of seconds",
    })?;
    Ok(Duration::from_secs(secs))
}

/// Consecutive failures of one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub attempts: u32,
}

impl BackoffState {
    /// Record a failure and return the delay before the next attempt
    pub fn next_delay(&mut self, backoff: &ExponentialBackoff) -> Duration {
        let delay = backoff.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InMemoryProvider;
    use std::sync::Arc;

    #[test]
    fn test_delay_doubles_until_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(30));
        let delays: Vec<u64> = (0..6).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_state_counts_attempts() {
        let backoff = ExponentialBackoff::default();
        let mut state = BackoffState::default();
        assert_eq!(state.next_delay(&backoff), Duration::from_secs(2));
        assert_eq!(state.next_delay(&backoff), Duration::from_secs(4));
        assert_eq!(state.attempts, 2);
    }

    #[test]
    fn test_from_store_reads_seconds() {
        let store = ConfigStore::new();
        store.register(
            0,
            Arc::new(InMemoryProvider::with_items(
                "test",
                vec![
                    (keys::REQUEUE_BASE_DELAY.to_string(), "1".to_string()),
                    (keys::REQUEUE_MAX_DELAY.to_string(), "10".to_string()),
                ],
            )),
        );
        let backoff = ExponentialBackoff::from_store(&store).unwrap();
        assert_eq!(backoff.base(), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(10));
    }

    #[test]
    fn test_negative_delay_is_rejected() {
        let store = ConfigStore::new();
        store.register(
            0,
            Arc::new(InMemoryProvider::with_items(
                "test",
                vec![(keys::REQUEUE_BASE_DELAY.to_string(), "-1".to_string())],
            )),
        );
        assert!(ExponentialBackoff::from_store(&store).is_err());
    }
}
