//! # Infrastructure Layer
//!
//! Concrete implementations behind the core crate's seams:
//! - **Database**: PostgreSQL OTP store using SQLx
//! - **Cache**: Redis client and the distributed rate limiter
//! - **Channels**: SMTP, SMPP and Telegram delivery adapters
//!
//! [`OtpInfrastructure::initialize`] wires them into a ready coordinator.

// Re-export core types for convenience
pub use otp_core::errors::*;

/// Database module - PostgreSQL implementations using SQLx
pub mod database;

/// Cache module - Redis client and rate limiting
pub mod cache;

/// Delivery channel transports
pub mod channels;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use otp_core::domain::value_objects::Channel;
use otp_core::repositories::{InMemoryOtpStore, InMemoryRateLimiter, OtpStore, RateLimiter};
use otp_core::services::{
    AesGcmCodeEncryption, Clock, CoordinatorConfig, DeliveryDispatcher,
    IdentityDestinationResolver, OtpCoordinator, OtpSweeper, RetryPolicy, SystemClock,
};
use otp_shared::config::{AppConfig, RateLimitBackend, StoreBackend};

use crate::cache::{RedisClient, RedisRateLimiter};
use crate::channels::{build_adapters, SmppSession};
use crate::database::{DatabasePool, PgOtpStore};

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Database connection error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis cache error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// HTTP request error for external services
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// SMPP session error
    #[error("SMPP error: {0}")]
    Smpp(#[from] channels::smpp::SmppError),

    /// SMTP transport error
    #[error("Email error: {0}")]
    Email(String),

    /// General infrastructure error
    #[error("Infrastructure error: {0}")]
    General(String),
}

/// SQLSTATEs meaning "a concurrent writer got there first":
/// unique violation, serialization failure, deadlock
const CONFLICT_SQLSTATES: [&str; 3] = ["23505", "40001", "40P01"];

fn is_conflict(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| CONFLICT_SQLSTATES.contains(&&*code))
            .unwrap_or(false),
        _ => false,
    }
}

impl From<InfrastructureError> for DomainError {
    fn from(error: InfrastructureError) -> Self {
        match error {
            InfrastructureError::Database(e) if is_conflict(&e) => OtpError::StoreConflict.into(),
            InfrastructureError::Database(e) => OtpError::Storage {
                message: e.to_string(),
            }
            .into(),
            InfrastructureError::Cache(e) => OtpError::Storage {
                message: format!("rate limiter: {}", e),
            }
            .into(),
            InfrastructureError::Timeout(operation) => OtpError::Timeout { operation }.into(),
            other => DomainError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Reachability of the external dependencies in use
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `None` when records live in memory
    pub database: Option<bool>,
    /// `None` when rate limits live in memory
    pub cache: Option<bool>,
    pub channels: Vec<Channel>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.database.unwrap_or(true) && self.cache.unwrap_or(true)
    }
}

/// Everything the binary needs, wired from configuration
pub struct OtpInfrastructure {
    pub coordinator: Arc<OtpCoordinator>,
    pub sweeper: Arc<OtpSweeper>,
    pub store: Arc<dyn OtpStore>,
    database: Option<Arc<DatabasePool>>,
    redis: Option<Arc<RedisClient>>,
    smpp_session: Option<Arc<SmppSession>>,
}

impl OtpInfrastructure {
    /// Build store, rate limiter, channel adapters, coordinator and sweeper.
    ///
    /// Connects to PostgreSQL and Redis when they are the configured backends
    /// and runs migrations if `database.run_migrations` is set.
    pub async fn initialize(config: &AppConfig) -> Result<Self, InfrastructureError> {
        info!(environment = ?config.environment, "Initializing OTP infrastructure");
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (store, database): (Arc<dyn OtpStore>, Option<Arc<DatabasePool>>) =
            match config.database.backend {
                StoreBackend::Postgres => {
                    let pool = Arc::new(DatabasePool::new(config.database.clone()).await?);
                    if config.database.run_migrations {
                        pool.run_migrations().await?;
                    }
                    info!(pool = %pool.get_statistics(), "PostgreSQL OTP store ready");
                    (Arc::new(PgOtpStore::new(pool.get_pool().clone())), Some(pool))
                }
                StoreBackend::Memory => {
                    warn!("Using in-memory OTP store; records do not survive a restart");
                    (Arc::new(InMemoryOtpStore::new()), None)
                }
            };

        let (limiter, redis): (Arc<dyn RateLimiter>, Option<Arc<RedisClient>>) =
            match config.rate_limit.backend {
                RateLimitBackend::Redis => {
                    let client = Arc::new(RedisClient::new(config.cache.clone()).await?);
                    let limiter =
                        RedisRateLimiter::new(client.clone(), config.rate_limit.clone(), clock.clone());
                    (Arc::new(limiter), Some(client))
                }
                RateLimitBackend::Memory => (
                    Arc::new(InMemoryRateLimiter::new(config.rate_limit.clone(), clock.clone())),
                    None,
                ),
            };

        let coordinator_config = CoordinatorConfig::from_otp_config(&config.otp).map_err(config_error)?;
        let encryption = AesGcmCodeEncryption::from_config(&config.otp).map_err(config_error)?;

        let channel_set = build_adapters(&config.channels)?;
        let dispatcher = channel_set.adapters.iter().cloned().fold(
            DeliveryDispatcher::new(
                store.clone(),
                Arc::new(IdentityDestinationResolver),
                clock.clone(),
                RetryPolicy::from_config(&config.otp.delivery),
            )
            .with_store_timeout(coordinator_config.store_timeout),
            |dispatcher, adapter| dispatcher.register(adapter),
        );

        let coordinator = Arc::new(OtpCoordinator::new(
            store.clone(),
            limiter,
            Arc::new(dispatcher),
            Arc::new(encryption),
            clock.clone(),
            coordinator_config,
        ));
        let sweeper = Arc::new(OtpSweeper::from_config(store.clone(), clock, &config.otp));

        info!(
            store = ?config.database.backend,
            rate_limit = ?config.rate_limit.backend,
            channels = ?coordinator.channels(),
            "OTP infrastructure initialized"
        );

        Ok(Self {
            coordinator,
            sweeper,
            store,
            database,
            redis,
            smpp_session: channel_set.smpp_session,
        })
    }

    /// Start the sweeper and, with SMPP, the enquire_link keepalive
    pub fn start_background(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = vec![self.sweeper.clone().start(shutdown.clone())];
        if let Some(session) = &self.smpp_session {
            handles.push(session.clone().spawn_keepalive(shutdown));
        }
        handles
    }

    pub async fn health(&self) -> HealthStatus {
        let database = match &self.database {
            Some(pool) => Some(pool.health_check().await.unwrap_or(false)),
            None => None,
        };
        let cache = match &self.redis {
            Some(client) => Some(client.health_check().await.unwrap_or(false)),
            None => None,
        };

        HealthStatus {
            database,
            cache,
            channels: self.coordinator.channels(),
        }
    }

    /// Close pooled connections
    pub async fn close(&self) {
        if let Some(pool) = &self.database {
            pool.close().await;
        }
    }
}

fn config_error(error: DomainError) -> InfrastructureError {
    InfrastructureError::Config(error.to_string())
}
