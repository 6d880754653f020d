//! OTP lifecycle error taxonomy
//!
//! Every variant maps to its own caller-visible status in the presentation
//! layer. Transient delivery failures and store conflicts are retried
//! internally and only surface once their retry budget is spent.

use thiserror::Error;

use crate::domain::value_objects::Channel;

/// Errors raised while issuing, delivering or verifying a code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Delivery via {channel} failed after retries: {reason}")]
    DeliveryTransient { channel: Channel, reason: String },

    #[error("Delivery via {channel} rejected: {reason}")]
    DeliveryPermanent { channel: Channel, reason: String },

    #[error("Code expired")]
    CodeExpired,

    #[error("Code mismatch, {remaining_attempts} attempt(s) remaining")]
    CodeMismatch { remaining_attempts: u32 },

    #[error("Code locked out after too many failed attempts")]
    CodeLockedOut,

    #[error("Concurrent modification of the same code")]
    StoreConflict,

    #[error("Channel {channel} is not available")]
    ChannelUnavailable { channel: Channel },

    #[error("No active code")]
    NoActiveCode,

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl OtpError {
    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            OtpError::Validation { .. } => "VALIDATION_ERROR",
            OtpError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            OtpError::DeliveryTransient { .. } | OtpError::DeliveryPermanent { .. } => {
                "DELIVERY_FAILED"
            }
            OtpError::CodeExpired => "CODE_EXPIRED",
            OtpError::CodeMismatch { .. } => "CODE_MISMATCH",
            OtpError::CodeLockedOut => "CODE_LOCKED_OUT",
            OtpError::StoreConflict => "STORE_CONFLICT",
            OtpError::ChannelUnavailable { .. } => "CHANNEL_UNAVAILABLE",
            OtpError::NoActiveCode => "NO_ACTIVE_CODE",
            OtpError::Timeout { .. } => "TIMEOUT",
            OtpError::Storage { .. } => "STORAGE_ERROR",
            OtpError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
