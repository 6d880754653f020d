use actix_web::{web, HttpResponse};

use crate::app::AppState;

/// Handler for GET /health
///
/// 200 when every configured backend answers, 503 otherwise. Backends that
/// are not in use (in-memory store or limiter) are reported as `null`.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let (healthy, database, cache, channels) = match &state.infrastructure {
        Some(infrastructure) => {
            let status = infrastructure.health().await;
            (status.is_healthy(), status.database, status.cache, status.channels)
        }
        None => (true, None, None, state.coordinator.channels()),
    };

    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "otp-api",
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "cache": cache,
        "channels": channels,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        tracing::warn!(?database, ?cache, "Health check reports degraded backends");
        HttpResponse::ServiceUnavailable().json(body)
    }
}
