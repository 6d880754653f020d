use actix_web::{web, HttpResponse};
use validator::Validate;

use otp_shared::identity::mask_identity;

use crate::app::AppState;
use crate::dto::{VerifyOtpRequest, VerifyResponse};
use crate::handlers::{handle_domain_error, handle_validation_errors, status_for};

/// Handler for POST /api/v1/otp/verify
///
/// Answers 200 `valid`, 401 `invalid` with `remaining_attempts`,
/// 410 `expired` or 423 `locked_out`.
pub async fn verify_otp(
    state: web::Data<AppState>,
    request: web::Json<VerifyOtpRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    if let Err(errors) = request.validate() {
        return handle_validation_errors(&errors);
    }

    match state
        .coordinator
        .verify_otp(&request.identity, &request.purpose, &request.code)
        .await
    {
        Ok(outcome) => {
            let status = outcome
                .as_error()
                .map(|error| status_for(&error))
                .unwrap_or(actix_web::http::StatusCode::OK);
            HttpResponse::build(status).json(VerifyResponse::from(outcome))
        }
        Err(error) => {
            tracing::warn!(
                identity = %mask_identity(&request.identity),
                error = %error,
                "OTP verification failed"
            );
            handle_domain_error(&error)
        }
    }
}
