//! Redis-backed issuance rate limiter
//!
//! Check and increment run inside one Lua script, so concurrent requests for
//! the same (identity, channel) from any number of instances are serialised
//! by Redis. Identities are hashed before they become part of a key.

use async_trait::async_trait;
use redis::Script;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use otp_core::domain::entities::RateDecision;
use otp_core::domain::value_objects::Channel;
use otp_core::errors::DomainError;
use otp_core::repositories::RateLimiter;
use otp_core::services::clock::Clock;
use otp_shared::config::{RateLimitConfig, WindowStrategy};
use otp_shared::utils::mask_identity;

use crate::cache::redis_client::RedisClient;
use crate::InfrastructureError;

// KEYS[1] counter; ARGV[1] limit; ARGV[2] window in ms
// Returns {allowed, count, retry_after_ms}
const FIXED_WINDOW_SCRIPT: &str = r#"
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
if count >= limit then
    local ttl = redis.call('PTTL', KEYS[1])
    if ttl < 0 then ttl = window end
    return {0, count, ttl}
end
count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], window)
end
return {1, count, 0}
"#;

// KEYS[1] sorted set of request timestamps; ARGV[1] limit; ARGV[2] window in ms;
// ARGV[3] now in ms; ARGV[4] unique member
const SLIDING_WINDOW_SCRIPT: &str = r#"
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])
if count >= limit then
    local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
    local retry = window
    if oldest[2] then
        retry = tonumber(oldest[2]) + window - now
    end
    return {0, count, retry}
end
redis.call('ZADD', KEYS[1], now, ARGV[4])
redis.call('PEXPIRE', KEYS[1], window)
return {1, count + 1, 0}
"#;

/// Rate limiter sharing its windows across instances through Redis
pub struct RedisRateLimiter {
    redis_client: Arc<RedisClient>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    fixed: Script,
    sliding: Script,
}

impl RedisRateLimiter {
    pub fn new(redis_client: Arc<RedisClient>, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            redis_client,
            config,
            clock,
            fixed: Script::new(FIXED_WINDOW_SCRIPT),
            sliding: Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }

    fn window_key(&self, strategy: WindowStrategy, identity: &str, channel: Channel) -> String {
        let kind = match strategy {
            WindowStrategy::Fixed => "fixed",
            WindowStrategy::Sliding => "sliding",
        };
        self.redis_client
            .key(&["rate", kind, channel.as_str(), &hash_identity(identity)])
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
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

        let key = self.window_key(self.config.strategy, identity, channel);
        let window_ms = limit.window_seconds.saturating_mul(1000);
        let mut conn = self.redis_client.get_connection();

        let reply: (i64, i64, i64) = match self.config.strategy {
            WindowStrategy::Fixed => {
                self.fixed
                    .key(&key)
                    .arg(limit.max_requests)
                    .arg(window_ms)
                    .invoke_async(&mut conn)
                    .await
            }
            WindowStrategy::Sliding => {
                let now_ms = self.clock.now().timestamp_millis();
                self.sliding
                    .key(&key)
                    .arg(limit.max_requests)
                    .arg(window_ms)
                    .arg(now_ms)
                    .arg(format!("{}-{}", now_ms, Uuid::new_v4().simple()))
                    .invoke_async(&mut conn)
                    .await
            }
        }
        .map_err(InfrastructureError::Cache)?;

        let decision = decision_from_reply(reply, limit.max_requests);
        debug!(
            identity = %mask_identity(identity),
            channel = %channel,
            allowed = decision.is_allowed(),
            "Rate limit checked"
        );
        Ok(decision)
    }

    async fn reset(&self, identity: &str, channel: Channel) -> Result<(), DomainError> {
        let keys = vec![
            self.window_key(WindowStrategy::Fixed, identity, channel),
            self.window_key(WindowStrategy::Sliding, identity, channel),
        ];
        let mut conn = self.redis_client.get_connection();
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(InfrastructureError::Cache)?;
        Ok(())
    }
}

/// Hex SHA-256 prefix of the identity, so keys carry no personal data
fn hash_identity(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    hex::encode(&digest[..16])
}

/// Interpret the `{allowed, count, retry_after_ms}` script reply
fn decision_from_reply((allowed, count, retry_ms): (i64, i64, i64), limit: u32) -> RateDecision {
    if allowed == 1 {
        let used = count.max(0) as u32;
        RateDecision::Allowed {
            remaining: limit.saturating_sub(used),
            limit,
        }
    } else {
        let retry_after_seconds = ((retry_ms.max(0) as u64) + 999) / 1000;
        RateDecision::Denied {
            retry_after_seconds: retry_after_seconds.max(1),
            limit,
        }
    }
}
