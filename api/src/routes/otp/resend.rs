use actix_web::{web, HttpResponse};
use validator::Validate;

use otp_core::errors::OtpError;
use otp_shared::identity::mask_identity;

use crate::app::AppState;
use crate::dto::{ResendOtpRequest, ResendResponse};
use crate::handlers::{handle_domain_error, handle_validation_errors};

/// Handler for POST /api/v1/otp/resend
///
/// Re-delivers the active code, optionally over another channel. Without an
/// active code the answer is 409 `{"status": "denied"}`, for known and
/// unknown identities alike.
pub async fn resend_otp(
    state: web::Data<AppState>,
    request: web::Json<ResendOtpRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    if let Err(errors) = request.validate() {
        return handle_validation_errors(&errors);
    }

    match state
        .coordinator
        .resend_otp(&request.identity, &request.purpose, request.channel)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(ResendResponse::from(outcome)),
        Err(error) if matches!(error.as_otp(), Some(OtpError::NoActiveCode)) => {
            tracing::info!(identity = %mask_identity(&request.identity), "Resend denied");
            HttpResponse::Conflict().json(ResendResponse::denied())
        }
        Err(error) => {
            tracing::warn!(
                identity = %mask_identity(&request.identity),
                error = %error,
                "OTP resend failed"
            );
            handle_domain_error(&error)
        }
    }
}
