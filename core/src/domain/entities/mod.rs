//! Domain entities representing the persisted OTP state.

pub mod delivery_attempt;
pub mod otp_record;
pub mod rate_limit_window;

// Re-export commonly used types
pub use delivery_attempt::{DeliveryAttempt, DeliveryStatus};
pub use otp_record::{
    CodeCipher, ConsumeOutcome, OtpRecord, OtpState, DEFAULT_MAX_ATTEMPTS, DEFAULT_TTL_SECONDS,
};
pub use rate_limit_window::{RateDecision, RateLimitWindow, SlidingWindowLog};
