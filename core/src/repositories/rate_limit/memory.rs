//! In-memory rate limiter (fixed or sliding window)

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use otp_shared::config::{RateLimitConfig, WindowStrategy};

use crate::domain::entities::{RateDecision, RateLimitWindow, SlidingWindowLog};
use crate::domain::value_objects::Channel;
use crate::errors::DomainError;
use crate::services::clock::Clock;

use super::r#trait::RateLimiter;

enum WindowState {
    Fixed(RateLimitWindow),
    Sliding(SlidingWindowLog),
}

impl WindowState {
    fn is_idle(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self {
            WindowState::Fixed(counter) => counter.is_elapsed(now, window),
            WindowState::Sliding(log) => log.is_idle(now, window),
        }
    }
}

#[derive(Default)]
struct Windows {
    entries: HashMap<(String, Channel), WindowState>,
    next_purge: Option<DateTime<Utc>>,
}

/// Process-local limiter; all keys share one mutex so check and increment
/// happen in a single critical section
///
/// Elapsed windows are dropped at most once per global window length, so the
/// map only holds keys seen within roughly the last two windows.
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<Windows>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Drop every window that no longer limits anything, returning how many
    pub async fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;
        self.purge_locked(&mut windows, now)
    }

    /// Number of (identity, channel) windows currently held
    pub async fn len(&self) -> usize {
        self.windows.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.windows.lock().await.entries.is_empty()
    }

    fn purge_locked(&self, windows: &mut Windows, now: DateTime<Utc>) -> usize {
        let before = windows.entries.len();
        windows.entries.retain(|(_, channel), state| {
            let limit = self.config.limit_for(channel.as_str());
            !state.is_idle(now, Duration::seconds(limit.window_seconds as i64))
        });
        windows.next_purge =
            Some(now + Duration::seconds(self.config.window_seconds.max(1) as i64));

        let purged = before - windows.entries.len();
        if purged > 0 {
            debug!(purged = purged, held = windows.entries.len(), "Dropped idle rate limit windows");
        }
        purged
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_increment(
        &self,
        identity: &str,
        channel: Channel,
    ) -> Result<RateDecision, DomainError> {
        let limit = self.config.limit_for(channel.as_str());
        if !self.config.enabled {
            return Ok(RateDecision::Allowed {
                remaining: limit.max_requests,
                limit: limit.max_requests,
            });
        }

        let now = self.clock.now();
        let window = Duration::seconds(limit.window_seconds as i64);

        let mut windows = self.windows.lock().await;
        match windows.next_purge {
            Some(at) if now < at => {}
            _ => {
                self.purge_locked(&mut windows, now);
            }
        }

        let state = windows
            .entries
            .entry((identity.to_string(), channel))
            .or_insert_with(|| match self.config.strategy {
                WindowStrategy::Fixed => {
                    WindowState::Fixed(RateLimitWindow::new(identity, channel, now))
                }
                WindowStrategy::Sliding => WindowState::Sliding(SlidingWindowLog::new()),
            });

        let decision = match state {
            WindowState::Fixed(counter) => counter.try_acquire(now, limit.max_requests, window),
            WindowState::Sliding(log) => log.try_acquire(now, limit.max_requests, window),
        };
        Ok(decision)
    }

    async fn reset(&self, identity: &str, channel: Channel) -> Result<(), DomainError> {
        self.windows
            .lock()
            .await
            .entries
            .remove(&(identity.to_string(), channel));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use chrono::Utc;
    use otp_shared::config::rate_limit::ChannelLimit;

    fn limiter(strategy: WindowStrategy) -> (InMemoryRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = RateLimitConfig {
            strategy,
            ..RateLimitConfig::default()
        };
        (InMemoryRateLimiter::new(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_sixth_request_in_window_is_denied() {
        for strategy in [WindowStrategy::Fixed, WindowStrategy::Sliding] {
            let (limiter, clock) = limiter(strategy);

            for _ in 0..5 {
                let decision = limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap();
                assert!(decision.is_allowed());
                clock.advance(Duration::seconds(30));
            }

            let decision = limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap();
            assert!(matches!(decision, RateDecision::Denied { limit: 5, .. }));
        }
    }

    #[tokio::test]
    async fn test_keys_are_per_identity_and_channel() {
        let (limiter, _clock) = limiter(WindowStrategy::Fixed);
        for _ in 0..5 {
            limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap();
        }

        assert!(limiter
            .check_and_increment("+15551234567", Channel::Telegram)
            .await
            .unwrap()
            .is_allowed());
        assert!(limiter
            .check_and_increment("+15557654321", Channel::Sms)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_window_elapses() {
        let (limiter, clock) = limiter(WindowStrategy::Fixed);
        for _ in 0..5 {
            limiter.check_and_increment("jane@example.com", Channel::Email).await.unwrap();
        }
        clock.advance(Duration::seconds(600));

        let decision = limiter.check_and_increment("jane@example.com", Channel::Email).await.unwrap();
        assert_eq!(decision, RateDecision::Allowed { remaining: 4, limit: 5 });
    }

    #[tokio::test]
    async fn test_reset_clears_key() {
        let (limiter, _clock) = limiter(WindowStrategy::Sliding);
        for _ in 0..5 {
            limiter.check_and_increment("jane@example.com", Channel::Email).await.unwrap();
        }
        limiter.reset("jane@example.com", Channel::Email).await.unwrap();
        assert!(limiter
            .check_and_increment("jane@example.com", Channel::Email)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_per_channel_override_and_disabled() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut config = RateLimitConfig::default();
        config.per_channel.insert(
            "sms".to_string(),
            ChannelLimit { max_requests: 1, window_seconds: 60 },
        );
        let limiter = InMemoryRateLimiter::new(config.clone(), clock.clone());
        assert!(limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap().is_allowed());
        assert!(!limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap().is_allowed());

        config.enabled = false;
        let limiter = InMemoryRateLimiter::new(config, clock);
        for _ in 0..10 {
            assert!(limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap().is_allowed());
        }
    }

    #[tokio::test]
    async fn test_elapsed_windows_are_dropped() {
        for strategy in [WindowStrategy::Fixed, WindowStrategy::Sliding] {
            let (limiter, clock) = limiter(strategy);
            for i in 0..10_000 {
                limiter
                    .check_and_increment(&format!("user{i}@example.com"), Channel::Email)
                    .await
                    .unwrap();
            }
            assert_eq!(limiter.len().await, 10_000);

            clock.advance(Duration::days(30));
            limiter.check_and_increment("jane@example.com", Channel::Email).await.unwrap();
            assert!(limiter.len().await <= 1);
        }
    }

    #[tokio::test]
    async fn test_purge_idle_keeps_live_windows() {
        let (limiter, clock) = limiter(WindowStrategy::Sliding);
        limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap();
        clock.advance(Duration::seconds(400));
        for _ in 0..5 {
            limiter.check_and_increment("+15557654321", Channel::Sms).await.unwrap();
        }

        clock.advance(Duration::seconds(250));
        assert_eq!(limiter.purge_idle().await, 1);
        assert_eq!(limiter.len().await, 1);

        // The surviving window still denies
        assert!(!limiter
            .check_and_increment("+15557654321", Channel::Sms)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_never_exceed_limit() {
        let (limiter, _clock) = limiter(WindowStrategy::Fixed);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.check_and_increment("+15551234567", Channel::Sms).await.unwrap()
                })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }
}
