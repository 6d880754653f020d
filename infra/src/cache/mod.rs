//! Cache module for Redis-backed state
//!
//! This module provides the shared Redis client and the Redis rate limiter.

pub mod rate_limiter;
pub mod redis_client;


pub use rate_limiter::RedisRateLimiter;
pub use redis_client::RedisClient;
