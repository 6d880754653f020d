//! OTP coordinator implementation

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;

use otp_shared::config::otp::MAX_CODE_LENGTH;
use otp_shared::config::DispatchMode;
use otp_shared::utils::{
    canonicalize_identity, is_valid_purpose, mask_identity, MAX_IDENTITY_LENGTH,
    MAX_PURPOSE_LENGTH,
};

use crate::domain::entities::{ConsumeOutcome, OtpRecord, RateDecision};
use crate::domain::value_objects::Channel;
use crate::errors::{DomainError, DomainResult, OtpError};
use crate::repositories::{OtpStore, RateLimiter};
use crate::services::clock::Clock;
use crate::services::code_generator::CodeGenerator;
use crate::services::deadline::with_timeout;
use crate::services::delivery::DeliveryDispatcher;
use crate::services::encryption::CodeEncryption;

use super::config::CoordinatorConfig;
use super::types::{DeliverySummary, RequestOutcome, ResendOutcome, VerifyOutcome};

/// Stateless orchestration over the store, limiter and dispatcher
pub struct OtpCoordinator {
    store: Arc<dyn OtpStore>,
    limiter: Arc<dyn RateLimiter>,
    dispatcher: Arc<DeliveryDispatcher>,
    encryption: Arc<dyn CodeEncryption>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl OtpCoordinator {
    /// Create a new coordinator
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for records and delivery attempts
    /// * `limiter` - Issuance rate limiter
    /// * `dispatcher` - Delivery dispatcher with its registered adapters
    /// * `encryption` - Cipher protecting codes at rest for resend
    /// * `clock` - Time source used for expiry decisions
    /// * `config` - Coordinator policy
    pub fn new(
        store: Arc<dyn OtpStore>,
        limiter: Arc<dyn RateLimiter>,
        dispatcher: Arc<DeliveryDispatcher>,
        encryption: Arc<dyn CodeEncryption>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            dispatcher,
            encryption,
            clock,
            config,
        }
    }

    /// Channels with a registered adapter
    pub fn channels(&self) -> Vec<Channel> {
        self.dispatcher.channels()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Issue a fresh code for (identity, purpose) and deliver it over `channel`
    ///
    /// This method:
    /// 1. Validates the identity, purpose and channel
    /// 2. Consults the rate limiter; a denial never reaches the generator
    /// 3. Generates the code and stores it, superseding any active one
    /// 4. Dispatches it inline or on a background task
    ///
    /// # Returns
    ///
    /// * `Ok(RequestOutcome)` - The stored record id, its expiry and the delivery state
    /// * `Err(DomainError)` - Validation, rate limit, channel, store or delivery failure.
    ///   After a delivery failure the code stays valid and can be resent.
    pub async fn request_otp(
        &self,
        identity: &str,
        purpose: &str,
        channel: Channel,
    ) -> DomainResult<RequestOutcome> {
        let (identity, purpose) = validate_tuple(identity, purpose)?;
        self.ensure_channel(channel)?;
        self.dispatcher.destination_for(&identity, channel)?;

        self.check_rate(&identity, channel).await?;

        let code = CodeGenerator::generate(self.config.code_length, &self.config.alphabet)?;
        let cipher = self.encryption.encrypt(&code)?;
        let record = OtpRecord::new(
            identity,
            purpose,
            channel,
            &code,
            cipher,
            self.config.ttl,
            self.config.max_attempts,
            self.clock.now(),
        );
        let record = self.issue(record).await?;

        tracing::info!(
            otp_id = %record.id,
            identity = %mask_identity(&record.identity),
            purpose = %record.purpose,
            channel = %channel,
            expires_at = %record.expires_at,
            event = "otp_issued",
            "OTP issued"
        );

        let delivery = self.deliver(&record, code, channel).await?;

        Ok(RequestOutcome {
            otp_id: record.id,
            expires_at: record.expires_at,
            delivery,
        })
    }

    /// Present a code for (identity, purpose)
    ///
    /// Unknown tuples and already consumed codes answer like a first mismatch,
    /// so responses do not reveal whether an identity has a code.
    pub async fn verify_otp(
        &self,
        identity: &str,
        purpose: &str,
        code: &str,
    ) -> DomainResult<VerifyOutcome> {
        let (identity, purpose) = validate_tuple(identity, purpose)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(DomainError::invalid("code", "code is required"));
        }
        if code.chars().count() > MAX_CODE_LENGTH {
            return Err(DomainError::invalid(
                "code",
                format!("code must be at most {} characters", MAX_CODE_LENGTH),
            ));
        }

        let now = self.clock.now();
        let outcome = self.consume(&identity, &purpose, code, now).await?;
        let masked = mask_identity(&identity);

        let result = match outcome {
            ConsumeOutcome::Valid => {
                tracing::info!(
                    identity = %masked,
                    purpose = %purpose,
                    event = "otp_verified",
                    "OTP verified"
                );
                VerifyOutcome::Valid
            }
            ConsumeOutcome::Mismatch { attempts, remaining } => {
                tracing::warn!(
                    identity = %masked,
                    purpose = %purpose,
                    attempts = attempts,
                    remaining_attempts = remaining,
                    event = "otp_mismatch",
                    "OTP mismatch"
                );
                VerifyOutcome::Invalid {
                    remaining_attempts: remaining,
                }
            }
            ConsumeOutcome::Expired => {
                tracing::info!(
                    identity = %masked,
                    purpose = %purpose,
                    event = "otp_expired",
                    "OTP expired"
                );
                VerifyOutcome::Expired
            }
            ConsumeOutcome::LockedOut => {
                tracing::warn!(
                    identity = %masked,
                    purpose = %purpose,
                    event = "otp_locked_out",
                    "OTP locked out after too many failed attempts"
                );
                VerifyOutcome::LockedOut
            }
            ConsumeOutcome::NotFound | ConsumeOutcome::AlreadyConsumed => {
                tracing::debug!(
                    identity = %masked,
                    purpose = %purpose,
                    outcome = ?outcome,
                    "Verification without a consumable code"
                );
                VerifyOutcome::Invalid {
                    remaining_attempts: self.config.max_attempts.saturating_sub(1),
                }
            }
        };

        Ok(result)
    }

    /// Deliver the active code again, over its original channel unless
    /// another one is given. Counts against the rate limit like a request.
    ///
    /// # Returns
    ///
    /// * `Ok(ResendOutcome)` - Same record id and expiry as the original issue
    /// * `Err(DomainError)` - `NoActiveCode` when nothing is active, for known
    ///   and unknown identities alike
    pub async fn resend_otp(
        &self,
        identity: &str,
        purpose: &str,
        channel: Option<Channel>,
    ) -> DomainResult<ResendOutcome> {
        let (identity, purpose) = validate_tuple(identity, purpose)?;
        let now = self.clock.now();

        let record = self
            .store_call(
                "store.find_active",
                self.store.find_active(&identity, &purpose, now),
            )
            .await?
            .ok_or(OtpError::NoActiveCode)?;

        let channel = channel.unwrap_or(record.channel);
        self.ensure_channel(channel)?;
        self.dispatcher.destination_for(&identity, channel)?;

        self.check_rate(&identity, channel).await?;

        let code = self.encryption.decrypt(&record.code_cipher)?;

        tracing::info!(
            otp_id = %record.id,
            identity = %mask_identity(&identity),
            purpose = %purpose,
            channel = %channel,
            original_channel = %record.channel,
            event = "otp_resend",
            "Resending active OTP"
        );

        let delivery = self.deliver(&record, code, channel).await?;

        Ok(ResendOutcome {
            otp_id: record.id,
            expires_at: record.expires_at,
            delivery,
        })
    }

    fn ensure_channel(&self, channel: Channel) -> DomainResult<()> {
        if self.dispatcher.supports(channel) {
            Ok(())
        } else {
            Err(OtpError::ChannelUnavailable { channel }.into())
        }
    }

    async fn check_rate(&self, identity: &str, channel: Channel) -> DomainResult<()> {
        let decision = self
            .store_call(
                "rate_limiter.check_and_increment",
                self.limiter.check_and_increment(identity, channel),
            )
            .await?;

        match decision {
            RateDecision::Allowed { .. } => Ok(()),
            RateDecision::Denied {
                retry_after_seconds,
                limit,
            } => {
                tracing::warn!(
                    identity = %mask_identity(identity),
                    channel = %channel,
                    limit = limit,
                    retry_after_seconds = retry_after_seconds,
                    event = "rate_limit_exceeded",
                    "OTP request rate limit exceeded"
                );
                Err(OtpError::RateLimitExceeded { retry_after_seconds }.into())
            }
        }
    }

    /// Store a new record, retrying once when a concurrent issue conflicts
    async fn issue(&self, record: OtpRecord) -> DomainResult<OtpRecord> {
        match self
            .store_call("store.issue", self.store.issue(record.clone()))
            .await
        {
            Err(err) if err.is_store_conflict() => {
                tracing::warn!(
                    otp_id = %record.id,
                    identity = %mask_identity(&record.identity),
                    event = "otp_store_conflict",
                    "Conflict while issuing, retrying once"
                );
                self.store_call("store.issue", self.store.issue(record)).await
            }
            other => other,
        }
    }

    async fn consume(
        &self,
        identity: &str,
        purpose: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<ConsumeOutcome> {
        match self
            .store_call("store.consume", self.store.consume(identity, purpose, code, now))
            .await
        {
            Err(err) if err.is_store_conflict() => {
                tracing::warn!(
                    identity = %mask_identity(identity),
                    event = "otp_store_conflict",
                    "Conflict while consuming, retrying once"
                );
                self.store_call("store.consume", self.store.consume(identity, purpose, code, now))
                    .await
            }
            other => other,
        }
    }

    async fn deliver(
        &self,
        record: &OtpRecord,
        code: String,
        channel: Channel,
    ) -> DomainResult<DeliverySummary> {
        match self.config.dispatch_mode {
            DispatchMode::Inline => {
                let attempt = self
                    .dispatcher
                    .dispatch(record, &code, channel)
                    .await?
                    .into_result()?;
                Ok(DeliverySummary::from(&attempt))
            }
            DispatchMode::Background => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let record = record.clone();
                tokio::spawn(async move {
                    if let Err(err) = dispatcher.dispatch(&record, &code, channel).await {
                        tracing::error!(
                            otp_id = %record.id,
                            channel = %channel,
                            error = %err,
                            event = "otp_background_dispatch_failed",
                            "Background dispatch could not record its outcome"
                        );
                    }
                });
                Ok(DeliverySummary::pending(channel))
            }
        }
    }

    async fn store_call<T, F>(&self, operation: &str, fut: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        with_timeout(self.config.store_timeout, operation, fut).await
    }
}

/// Canonical identity and trimmed purpose, or a validation error
fn validate_tuple(identity: &str, purpose: &str) -> DomainResult<(String, String)> {
    let identity = canonicalize_identity(identity);
    if identity.is_empty() {
        return Err(DomainError::invalid("identity", "identity is required"));
    }
    if identity.chars().count() > MAX_IDENTITY_LENGTH {
        return Err(DomainError::invalid(
            "identity",
            format!("identity must be at most {} characters", MAX_IDENTITY_LENGTH),
        ));
    }

    let purpose = purpose.trim();
    if purpose.is_empty() || purpose.len() > MAX_PURPOSE_LENGTH || !is_valid_purpose(purpose) {
        return Err(DomainError::invalid(
            "purpose",
            format!(
                "purpose must be 1-{} lowercase letters, digits, '_', '.' or '-', starting with a letter",
                MAX_PURPOSE_LENGTH
            ),
        ));
    }

    Ok((identity, purpose.to_string()))
}
