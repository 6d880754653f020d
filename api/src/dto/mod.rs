//! Request and response bodies

pub mod error;
pub mod otp;

pub use error::{error_codes, ErrorResponse, ErrorResponseExt};
pub use otp::{
    DeliveryDto, IssuedResponse, RequestOtpRequest, ResendOtpRequest, ResendResponse,
    VerifyOtpRequest, VerifyResponse,
};
