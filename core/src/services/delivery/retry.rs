//! Exponential backoff policy for channel adapters

use std::time::Duration;

use otp_shared::config::DeliveryRetryConfig;

/// Bounded retry policy for a single dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Adapter invocations, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Longest provider hint worth waiting for
    pub max_hint_delay: Duration,
    /// Upper bound for one adapter call
    pub adapter_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryRetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_hint_delay: Duration::from_millis(config.max_hint_delay_ms.max(config.max_delay_ms)),
            adapter_timeout: Duration::from_secs(config.adapter_timeout_secs),
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    ///
    /// A provider hint longer than the backoff wins, up to `max_hint_delay`.
    /// Throttling providers (Telegram 429s) usually ask for 5s or more, past
    /// the backoff ceiling. A hint beyond `max_hint_delay` returns `None`: the
    /// provider will not accept a retry within budget. In inline dispatch mode
    /// the wait is part of the request latency.
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Option<Duration> {
        let factor = 2u32.saturating_pow(retry);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);

        match hint {
            Some(hint) if hint > self.max_hint_delay => None,
            Some(hint) => Some(backoff.max(hint)),
            None => Some(backoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, None), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(1, None), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_for(2, None), Some(Duration::from_millis(2000)));
        assert_eq!(policy.delay_for(5, None), Some(Duration::from_millis(5000)));
        assert_eq!(policy.delay_for(40, None), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_provider_hint_is_honoured() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(3))),
            Some(Duration::from_secs(3))
        );
        // Shorter hints never shorten the backoff
        assert_eq!(
            policy.delay_for(2, Some(Duration::from_millis(100))),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(policy.delay_for(0, Some(Duration::from_secs(45))), None);
    }

    #[test]
    fn test_hints_above_backoff_ceiling_are_waited_out() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_hint_delay, Duration::from_secs(30));
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(8))),
            Some(Duration::from_secs(8))
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(30))),
            Some(Duration::from_secs(30))
        );

        // The hint cap never drops below the backoff ceiling
        let policy = RetryPolicy::from_config(&DeliveryRetryConfig {
            max_hint_delay_ms: 1000,
            ..DeliveryRetryConfig::default()
        });
        assert_eq!(policy.max_hint_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_defaults_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.adapter_timeout, Duration::from_secs(10));
    }
}
