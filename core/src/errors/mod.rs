//! Domain-specific error types and error handling.

mod types;


pub use types::OtpError;

use thiserror::Error;

/// Core domain errors (general purpose)
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Bridge to OTP lifecycle errors
    #[error(transparent)]
    Otp(#[from] OtpError),
}

impl DomainError {
    /// Shorthand for a field-level validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Otp(OtpError::Validation {
            field: field.into(),
            message: message.into(),
        })
    }

    /// Whether the error is a store conflict that may succeed on retry
    pub fn is_store_conflict(&self) -> bool {
        matches!(self, DomainError::Otp(OtpError::StoreConflict))
    }

    /// Borrow the OTP error if this is one
    pub fn as_otp(&self) -> Option<&OtpError> {
        match self {
            DomainError::Otp(err) => Some(err),
            _ => None,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
