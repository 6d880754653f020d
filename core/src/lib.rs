//! # OTP Core
//!
//! Domain layer of the OTP issuance and delivery service.
//! This crate contains the record and delivery entities, the error taxonomy,
//! the store and rate limiter interfaces with in-memory implementations, and
//! the coordinator that drives a code from issuance to verification.

pub mod domain;
pub mod services;
pub mod repositories;
pub mod errors;

// Re-export commonly used types for convenience
pub use domain::*;
pub use services::*;
pub use repositories::*;
pub use errors::*;
