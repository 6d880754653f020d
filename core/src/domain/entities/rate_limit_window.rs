//! Rate limit window entities.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::value_objects::Channel;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RateDecision {
    Allowed { remaining: u32, limit: u32 },
    Denied { retry_after_seconds: u64, limit: u32 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Fixed window counter for one (identity, channel) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub identity: String,
    pub channel: Channel,
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl RateLimitWindow {
    pub fn new(identity: impl Into<String>, channel: Channel, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            channel,
            count: 0,
            window_start: now,
        }
    }

    pub fn is_elapsed(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.window_start + window
    }

    /// Resets an elapsed window, then counts the request if under `limit`
    pub fn try_acquire(&mut self, now: DateTime<Utc>, limit: u32, window: Duration) -> RateDecision {
        if self.is_elapsed(now, window) {
            self.count = 0;
            self.window_start = now;
        }

        if self.count >= limit {
            return RateDecision::Denied {
                retry_after_seconds: seconds_until(now, self.window_start + window),
                limit,
            };
        }

        self.count += 1;
        RateDecision::Allowed {
            remaining: limit - self.count,
            limit,
        }
    }
}

/// Rolling log of request timestamps for the sliding strategy
#[derive(Debug, Clone, Default)]
pub struct SlidingWindowLog {
    hits: VecDeque<DateTime<Utc>>,
}

impl SlidingWindowLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&mut self, now: DateTime<Utc>, limit: u32, window: Duration) -> RateDecision {
        let horizon = now - window;
        while matches!(self.hits.front(), Some(hit) if *hit <= horizon) {
            self.hits.pop_front();
        }

        if self.hits.len() as u32 >= limit {
            let oldest = self.hits.front().copied().unwrap_or(now);
            return RateDecision::Denied {
                retry_after_seconds: seconds_until(now, oldest + window),
                limit,
            };
        }

        self.hits.push_back(now);
        RateDecision::Allowed {
            remaining: limit - self.hits.len() as u32,
            limit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// True when no recorded hit still counts towards the window
    pub fn is_idle(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.hits.back().map_or(true, |last| *last <= now - window)
    }
}

/// Whole seconds until `until`, at least 1
fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0) as u64;
    ((millis + 999) / 1000).max(1)
}
