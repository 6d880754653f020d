//! Shared error envelope and error codes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard error response structure used across all API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for client identification
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error details (field errors, retry hints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,

    /// Timestamp when the error occurred
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Add a detail field to the error response
    pub fn add_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let details = self.details.get_or_insert_with(HashMap::new);
        if let Ok(json_value) = serde_json::to_value(value) {
            details.insert(key.into(), json_value);
        }
        self
    }
}

/// Error codes returned by the OTP API
pub mod error_codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const CODE_EXPIRED: &str = "CODE_EXPIRED";
    pub const CODE_MISMATCH: &str = "CODE_MISMATCH";
    pub const CODE_LOCKED_OUT: &str = "CODE_LOCKED_OUT";
    pub const NO_ACTIVE_CODE: &str = "NO_ACTIVE_CODE";
    pub const DELIVERY_FAILED: &str = "DELIVERY_FAILED";
    pub const CHANNEL_UNAVAILABLE: &str = "CHANNEL_UNAVAILABLE";
    pub const STORE_CONFLICT: &str = "STORE_CONFLICT";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}
