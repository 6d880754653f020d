use actix_web::{web, HttpResponse};
use validator::Validate;

use otp_shared::identity::mask_identity;

use crate::app::AppState;
use crate::dto::{IssuedResponse, RequestOtpRequest};
use crate::handlers::{handle_domain_error, handle_validation_errors};

/// Handler for POST /api/v1/otp/request
///
/// Issues a new code for (identity, purpose) and delivers it over `channel`.
///
/// # Request Body
///
/// ```json
/// {
///     "identity": "+15551234567",
///     "purpose": "login",
///     "channel": "sms"
/// }
/// ```
///
/// # Response
///
/// ## Success (200 OK)
/// ```json
/// {
///     "status": "issued",
///     "otp_id": "550e8400-e29b-41d4-a716-446655440000",
///     "expires_at": "2025-08-14T10:05:00Z",
///     "delivery": { "status": "sent", "channel": "sms" }
/// }
/// ```
///
/// ## Errors
/// - 400 invalid body or identity
/// - 429 rate limit exceeded, with `Retry-After`
/// - 503 channel unavailable or delivery failed (the code stays resendable)
pub async fn request_otp(
    state: web::Data<AppState>,
    request: web::Json<RequestOtpRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    if let Err(errors) = request.validate() {
        tracing::warn!(fields = ?errors.field_errors().keys().collect::<Vec<_>>(), "Invalid OTP request");
        return handle_validation_errors(&errors);
    }

    let masked = mask_identity(&request.identity);
    tracing::debug!(identity = %masked, purpose = %request.purpose, channel = %request.channel, "Processing OTP request");

    match state
        .coordinator
        .request_otp(&request.identity, &request.purpose, request.channel)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(IssuedResponse::from(outcome)),
        Err(error) => {
            tracing::warn!(identity = %masked, channel = %request.channel, error = %error, "OTP request failed");
            handle_domain_error(&error)
        }
    }
}
