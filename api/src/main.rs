use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tokio::sync::watch;
use tracing_actix_web::TracingLogger;

use otp_api::middleware::SecurityHeaders;
use otp_api::telemetry::init_tracing;
use otp_api::{configure_app, AppState};
use otp_infra::OtpInfrastructure;
use otp_shared::config::AppConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Reads .env, config/<environment>.toml and OTP__* variables
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging)?;

    tracing::info!(
        environment = %config.environment,
        version = env!("CARGO_PKG_VERSION"),
        "Starting OTP API server"
    );

    let infrastructure = Arc::new(
        OtpInfrastructure::initialize(&config)
            .await
            .context("failed to initialize infrastructure")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = infrastructure.start_background(shutdown_rx);

    let state = web::Data::new(AppState::from_infrastructure(infrastructure.clone()));
    let environment = config.environment;
    let payload_limit = config.server.max_payload_size;
    let bind_address = config.server.bind_address();

    tracing::info!(
        address = %bind_address,
        workers = config.server.worker_count(),
        "HTTP server listening"
    );

    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .wrap(SecurityHeaders::for_environment(environment))
            .configure(|cfg| configure_app(cfg, payload_limit))
    })
    .workers(config.server.worker_count())
    .keep_alive(Duration::from_secs(config.server.keep_alive))
    .shutdown_timeout(config.server.shutdown_timeout)
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .run()
    .await;

    tracing::info!("Shutting down background tasks");
    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    infrastructure.close().await;

    result.context("HTTP server error")
}
