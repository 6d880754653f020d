//! Translation of domain errors into HTTP responses
//!
//! Every `OtpError` variant keeps its own status and machine-readable code;
//! nothing is collapsed into a generic failure.

use actix_web::http::header::{HeaderValue, RETRY_AFTER};
use actix_web::http::StatusCode;
use actix_web::{error::JsonPayloadError, HttpRequest, HttpResponse};
use validator::ValidationErrors;

use otp_core::errors::{DomainError, OtpError};

use crate::dto::{error_codes, ErrorResponse, ErrorResponseExt};

/// HTTP status for an OTP error
pub fn status_for(error: &OtpError) -> StatusCode {
    match error {
        OtpError::Validation { .. } => StatusCode::BAD_REQUEST,
        OtpError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        OtpError::DeliveryTransient { .. } | OtpError::DeliveryPermanent { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OtpError::CodeExpired => StatusCode::GONE,
        OtpError::CodeMismatch { .. } => StatusCode::UNAUTHORIZED,
        OtpError::CodeLockedOut => StatusCode::LOCKED,
        OtpError::StoreConflict | OtpError::NoActiveCode => StatusCode::CONFLICT,
        OtpError::ChannelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OtpError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OtpError::Storage { .. } | OtpError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handle domain errors and convert them to appropriate HTTP responses
pub fn handle_domain_error(error: &DomainError) -> HttpResponse {
    match error {
        DomainError::Otp(otp) => handle_otp_error(otp),
        DomainError::Validation { message } => {
            ErrorResponse::new(error_codes::VALIDATION_ERROR, message.clone())
                .to_response(StatusCode::BAD_REQUEST)
        }
        DomainError::NotFound { resource } => {
            ErrorResponse::new(error_codes::NOT_FOUND, format!("{} not found", resource))
                .to_response(StatusCode::NOT_FOUND)
        }
        DomainError::Internal { message } => {
            tracing::error!(error = %message, "Internal error");
            internal_error()
        }
    }
}

fn handle_otp_error(error: &OtpError) -> HttpResponse {
    let status = status_for(error);
    let body = ErrorResponse::new(error.code(), error.to_string());

    match error {
        OtpError::Validation { field, .. } => body.add_detail("field", field).to_response(status),
        OtpError::RateLimitExceeded {
            retry_after_seconds,
        } => {
            let mut response = body
                .add_detail("retry_after", retry_after_seconds)
                .to_response(status);
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
        OtpError::DeliveryTransient { channel, .. } => body
            .add_detail("channel", channel)
            .add_detail("retryable", true)
            .to_response(status),
        OtpError::DeliveryPermanent { channel, .. } => body
            .add_detail("channel", channel)
            .add_detail("retryable", false)
            .to_response(status),
        OtpError::ChannelUnavailable { channel } => body.add_detail("channel", channel).to_response(status),
        OtpError::CodeMismatch { remaining_attempts } => body
            .add_detail("remaining_attempts", remaining_attempts)
            .to_response(status),
        OtpError::Storage { message } | OtpError::Internal { message } => {
            tracing::error!(error = %message, code = error.code(), "Request failed");
            ErrorResponse::new(error.code(), "An internal error occurred").to_response(status)
        }
        _ => body.to_response(status),
    }
}

/// 400 with the failing fields listed under `details.fields`
pub fn handle_validation_errors(errors: &ValidationErrors) -> HttpResponse {
    let fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|field| field.to_string())
        .collect();

    ErrorResponse::new(error_codes::VALIDATION_ERROR, "Invalid request data")
        .add_detail("fields", fields)
        .to_response(StatusCode::BAD_REQUEST)
}

/// Rejections from the JSON extractor (malformed body, unknown channel)
pub fn json_error_handler(error: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = ErrorResponse::new(error_codes::BAD_REQUEST, error.to_string())
        .to_response(StatusCode::BAD_REQUEST);
    actix_web::error::InternalError::from_response(error, response).into()
}

fn internal_error() -> HttpResponse {
    ErrorResponse::new(error_codes::INTERNAL_ERROR, "An internal error occurred")
        .to_response(StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otp_core::domain::value_objects::Channel;

    #[test]
    fn test_each_error_has_a_distinct_status() {
        assert_eq!(
            status_for(&OtpError::RateLimitExceeded {
                retry_after_seconds: 30
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for(&OtpError::CodeExpired), StatusCode::GONE);
        assert_eq!(status_for(&OtpError::CodeLockedOut), StatusCode::LOCKED);
        assert_eq!(
            status_for(&OtpError::ChannelUnavailable {
                channel: Channel::Telegram
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&OtpError::Internal {
                message: "x".to_string()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limit_sets_retry_after_header() {
        let error: DomainError = OtpError::RateLimitExceeded {
            retry_after_seconds: 42,
        }
        .into();
        let response = handle_domain_error(&error);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let error: DomainError = OtpError::Storage {
            message: "connection refused to 10.0.0.5".to_string(),
        }
        .into();
        let response = handle_domain_error(&error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
