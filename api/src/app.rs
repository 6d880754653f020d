//! Application state and route table
//!
//! This module holds the shared state handed to every handler and the
//! route table of the Actix-web application.

use std::sync::Arc;

use actix_web::{web, HttpResponse};

use otp_core::services::OtpCoordinator;
use otp_infra::OtpInfrastructure;

use crate::dto::{error_codes, ErrorResponse};
use crate::handlers::json_error_handler;
use crate::routes::{health_check, request_otp, resend_otp, verify_otp};

/// Default JSON body limit when no server configuration is supplied
pub const DEFAULT_PAYLOAD_LIMIT: usize = 16 * 1024;

/// Shared services available to every handler
pub struct AppState {
    pub coordinator: Arc<OtpCoordinator>,
    /// Present when wired from configuration; used by the health probe
    pub infrastructure: Option<Arc<OtpInfrastructure>>,
}

impl AppState {
    pub fn new(coordinator: Arc<OtpCoordinator>) -> Self {
        Self {
            coordinator,
            infrastructure: None,
        }
    }

    pub fn from_infrastructure(infrastructure: Arc<OtpInfrastructure>) -> Self {
        Self {
            coordinator: infrastructure.coordinator.clone(),
            infrastructure: Some(infrastructure),
        }
    }
}

/// Register the JSON extractor settings, the health probe and the OTP routes
///
/// Middleware is applied by the caller so tests can mount the routes bare.
pub fn configure_app(cfg: &mut web::ServiceConfig, payload_limit: usize) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(payload_limit)
            .error_handler(json_error_handler),
    )
    .route("/health", web::get().to(health_check))
    .service(
        web::scope("/api/v1/otp")
            .route("/request", web::post().to(request_otp))
            .route("/verify", web::post().to(verify_otp))
            .route("/resend", web::post().to(resend_otp)),
    )
    .default_service(web::route().to(not_found));
}

/// Default 404 handler
async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse::new(
        error_codes::NOT_FOUND,
        "The requested resource was not found",
    ))
}
