//! OTP route handlers
//!
//! Each handler validates the body, calls the coordinator and maps the
//! outcome onto a status code. Identities are masked in every log line.

pub mod request;
pub mod resend;
pub mod verify;

pub use request::request_otp;
pub use resend::resend_otp;
pub use verify::verify_otp;
