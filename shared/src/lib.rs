//! Shared utilities and common types for the OTP service
//!
//! This crate provides functionality used across all server crates:
//! - Configuration types and the layered configuration loader
//! - The API error envelope and error codes
//! - Identity utilities (phone, email, Telegram chat validation and masking)

pub mod config;
pub mod errors;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, CacheConfig, ChannelsConfig, ConfigError, DatabaseConfig, Environment,
    LoggingConfig, OtpConfig, RateLimitConfig, ServerConfig,
};
pub use errors::{error_codes, ErrorResponse};
pub use utils::{identity, phone, validation};
