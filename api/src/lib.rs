//! HTTP surface of the OTP service
//!
//! Exposed as a library so the route table can be exercised in tests.

pub mod app;
pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod telemetry;

pub use app::{configure_app, AppState, DEFAULT_PAYLOAD_LIMIT};
