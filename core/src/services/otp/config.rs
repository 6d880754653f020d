//! Configuration for the OTP coordinator

use std::time::Duration;

use otp_shared::config::{DispatchMode, OtpConfig};

use crate::domain::entities::{DEFAULT_MAX_ATTEMPTS, DEFAULT_TTL_SECONDS};
use crate::errors::DomainResult;
use crate::services::code_generator::Alphabet;

/// Runtime policy of the coordinator, resolved from `OtpConfig`
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of characters in a generated code
    pub code_length: usize,
    /// Alphabet codes are drawn from
    pub alphabet: Alphabet,
    /// Lifetime of an issued code
    pub ttl: chrono::Duration,
    /// Failed verifications before lockout
    pub max_attempts: u32,
    /// Upper bound for one store or limiter call
    pub store_timeout: Duration,
    /// Whether request and resend wait for the delivery outcome
    pub dispatch_mode: DispatchMode,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            alphabet: Alphabet::Numeric,
            ttl: chrono::Duration::seconds(DEFAULT_TTL_SECONDS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store_timeout: Duration::from_secs(5),
            dispatch_mode: DispatchMode::Inline,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_otp_config(config: &OtpConfig) -> DomainResult<Self> {
        Ok(Self {
            code_length: config.code_length,
            alphabet: Alphabet::from_config(config)?,
            ttl: chrono::Duration::seconds(config.ttl_seconds as i64),
            max_attempts: config.max_attempts,
            store_timeout: Duration::from_secs(config.store_timeout_secs),
            dispatch_mode: config.dispatch_mode,
        })
    }
}
