//! Rate limiting configuration module

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ConfigError;

/// Issuance rate limiting configuration
///
/// Limits are applied per (identity, channel) pair. A channel listed in
/// `per_channel` uses its own limit, every other channel uses the global one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Window accounting strategy
    #[serde(default)]
    pub strategy: WindowStrategy,

    /// Max issuance attempts per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Per-channel overrides keyed by channel name (`email`, `sms`, `telegram`)
    #[serde(default)]
    pub per_channel: HashMap<String, ChannelLimit>,

    /// Where window state lives
    #[serde(default)]
    pub backend: RateLimitBackend,
}

/// Limit override for a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelLimit {
    pub max_requests: u32,
    pub window_seconds: u64,
}

/// Window accounting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStrategy {
    /// Counter reset when the window elapses
    Fixed,
    /// Rolling window over individual request timestamps
    Sliding,
}

impl Default for WindowStrategy {
    fn default() -> Self {
        WindowStrategy::Fixed
    }
}

/// Rate limiter storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Process-local state (single instance deployments, tests)
    Memory,
    /// Shared Redis state
    Redis,
}

impl Default for RateLimitBackend {
    fn default() -> Self {
        RateLimitBackend::Memory
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            strategy: WindowStrategy::default(),
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            per_channel: HashMap::new(),
            backend: RateLimitBackend::default(),
        }
    }
}

impl RateLimitConfig {
    /// Create rate limit config for development
    pub fn development() -> Self {
        Self::default()
    }

    /// Create rate limit config for production
    pub fn production() -> Self {
        let mut per_channel = HashMap::new();
        // SMS costs money per message
        per_channel.insert(
            String::from("sms"),
            ChannelLimit {
                max_requests: 3,
                window_seconds: 600,
            },
        );

        Self {
            enabled: true,
            strategy: WindowStrategy::Sliding,
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            per_channel,
            backend: RateLimitBackend::Redis,
        }
    }

    /// Resolve the effective limit for a channel
    pub fn limit_for(&self, channel: &str) -> ChannelLimit {
        self.per_channel.get(channel).copied().unwrap_or(ChannelLimit {
            max_requests: self.max_requests,
            window_seconds: self.window_seconds,
        })
    }

    /// Validate limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| ConfigError::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        };

        if self.max_requests == 0 {
            return Err(invalid("rate_limit.max_requests", "must be at least 1"));
        }
        if self.window_seconds == 0 {
            return Err(invalid("rate_limit.window_seconds", "must be at least 1"));
        }
        for (channel, limit) in &self.per_channel {
            if limit.max_requests == 0 || limit.window_seconds == 0 {
                return Err(ConfigError::Invalid {
                    field: format!("rate_limit.per_channel.{}", channel),
                    message: "limit and window must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_five_per_ten_minutes() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_requests, 5);
        assert_eq!(config.window_seconds, 600);
        assert_eq!(config.strategy, WindowStrategy::Fixed);
        assert_eq!(config.backend, RateLimitBackend::Memory);
    }

    #[test]
    fn test_channel_override() {
        let config = RateLimitConfig::production();
        assert_eq!(config.limit_for("sms").max_requests, 3);
        assert_eq!(config.limit_for("email").max_requests, 5);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = RateLimitConfig {
            window_seconds: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
