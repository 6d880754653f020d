//! PostgreSQL repository implementations

pub mod otp_store_impl;

pub use otp_store_impl::PgOtpStore;
