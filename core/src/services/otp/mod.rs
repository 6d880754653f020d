//! OTP issuance and verification coordinator
//!
//! Orchestrates the full code lifecycle:
//! - rate limiting per identity and channel
//! - code generation and encrypted, hashed storage
//! - delivery through the dispatcher, inline or in the background
//! - atomic verification with attempt tracking and lockout
//! - resend of the active code over its original or an alternate channel

mod config;
mod coordinator;
mod types;


pub use config::CoordinatorConfig;
pub use coordinator::OtpCoordinator;
pub use types::{DeliverySummary, RequestOutcome, ResendOutcome, VerifyOutcome};
