//! HTTP route handlers
//!
//! - `otp` - request, verify and resend endpoints under `/api/v1/otp`
//! - `health` - dependency reachability probe

pub mod health;
pub mod otp;

pub use health::health_check;
pub use otp::{request_otp, resend_otp, verify_otp};
