//! Database module - PostgreSQL implementations using SQLx
//!
//! This module provides the database access layer including:
//! - Connection pool management
//! - The PostgreSQL OTP store
//! - Embedded migrations

pub mod connection;
pub mod postgres;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use connection::{DatabasePool, PoolStatistics};
pub use postgres::PgOtpStore;
