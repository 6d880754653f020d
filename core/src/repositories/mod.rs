//! Repository interfaces and in-memory implementations.
//!
//! Durable implementations (PostgreSQL, Redis) live in the infrastructure crate.

pub mod otp_store;
pub mod rate_limit;

pub use otp_store::{InMemoryOtpStore, OtpStore};
pub use rate_limit::{InMemoryRateLimiter, RateLimiter};
