//! Delivery dispatcher: adapter selection, retries and attempt bookkeeping

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use otp_shared::utils::mask_identity;

use crate::domain::entities::{DeliveryAttempt, OtpRecord};
use crate::domain::value_objects::Channel;
use crate::errors::{DomainResult, OtpError};
use crate::repositories::OtpStore;
use crate::services::channel::{ChannelAdapter, DeliveryResult, DestinationResolver};
use crate::services::clock::Clock;
use crate::services::deadline::with_timeout;

use super::retry::RetryPolicy;
use super::template;

/// Why a dispatch ended without delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Retries exhausted on transient failures
    Transient { reason: String },
    /// The transport refused the message outright
    Permanent { reason: String },
}

/// Final state of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempt: DeliveryAttempt,
    pub failure: Option<DeliveryFailure>,
}

impl DispatchReport {
    /// The attempt when delivered, otherwise the matching delivery error
    pub fn into_result(self) -> DomainResult<DeliveryAttempt> {
        let channel = self.attempt.channel;
        match self.failure {
            None => Ok(self.attempt),
            Some(DeliveryFailure::Transient { reason }) => {
                Err(OtpError::DeliveryTransient { channel, reason }.into())
            }
            Some(DeliveryFailure::Permanent { reason }) => {
                Err(OtpError::DeliveryPermanent { channel, reason }.into())
            }
        }
    }
}

/// Routes rendered codes to the adapter registered for each channel
pub struct DeliveryDispatcher {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    store: Arc<dyn OtpStore>,
    resolver: Arc<dyn DestinationResolver>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    store_timeout: Duration,
}

impl DeliveryDispatcher {
    pub fn new(
        store: Arc<dyn OtpStore>,
        resolver: Arc<dyn DestinationResolver>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            adapters: HashMap::new(),
            store,
            resolver,
            clock,
            policy,
            store_timeout: Duration::from_secs(5),
        }
    }

    /// Register an adapter under the channel it reports; replaces any previous one
    pub fn register(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.insert(adapter.channel(), adapter);
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.adapters.contains_key(&channel)
    }

    /// Registered channels, in a stable order
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }

    /// Address `identity` receives codes at on `channel`
    pub fn destination_for(&self, identity: &str, channel: Channel) -> DomainResult<String> {
        self.resolver.resolve(identity, channel)
    }

    /// Deliver `code` for `record` over `channel`.
    ///
    /// The attempt is stored as pending before the first adapter call and
    /// updated once with the final outcome. Delivery failures come back in the
    /// report. Errors are reserved for configuration problems and for failing
    /// to store the pending attempt; a failed final update is only logged.
    pub async fn dispatch(
        &self,
        record: &OtpRecord,
        code: &str,
        channel: Channel,
    ) -> DomainResult<DispatchReport> {
        let adapter = self
            .adapters
            .get(&channel)
            .cloned()
            .ok_or(OtpError::ChannelUnavailable { channel })?;
        let destination = self.resolver.resolve(&record.identity, channel)?;
        let masked = mask_identity(&destination);

        let now = self.clock.now();
        let message = template::render(channel, code, minutes_left(record, now));

        let mut attempt = DeliveryAttempt::new(record.id, channel, now);
        with_timeout(
            self.store_timeout,
            "store.record_delivery",
            self.store.record_delivery(&attempt),
        )
        .await?;

        let mut tries = 0;
        let failure = loop {
            tries += 1;
            let result = match tokio::time::timeout(
                self.policy.adapter_timeout,
                adapter.send(&destination, &message),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => DeliveryResult::transient(format!(
                    "adapter timed out after {}s",
                    self.policy.adapter_timeout.as_secs()
                )),
            };

            match result {
                DeliveryResult::Delivered { provider_message_id } => {
                    tracing::info!(
                        otp_id = %record.id,
                        channel = %channel,
                        destination = %masked,
                        tries = tries,
                        provider_message_id = %provider_message_id,
                        event = "otp_delivered",
                        "Code delivered"
                    );
                    attempt.mark_sent(provider_message_id, tries, self.clock.now())?;
                    break None;
                }
                DeliveryResult::PermanentFailure { reason, address_rejected } => {
                    tracing::warn!(
                        otp_id = %record.id,
                        channel = %channel,
                        destination = %masked,
                        tries = tries,
                        reason = %reason,
                        bounced = address_rejected,
                        event = "otp_delivery_rejected",
                        "Delivery permanently failed"
                    );
                    if address_rejected {
                        attempt.mark_bounced(reason.clone(), tries, self.clock.now())?;
                    } else {
                        attempt.mark_failed(reason.clone(), tries, self.clock.now())?;
                    }
                    break Some(DeliveryFailure::Permanent { reason });
                }
                DeliveryResult::TransientFailure { reason, retry_after } => {
                    let delay = if tries < self.policy.max_attempts {
                        self.policy.delay_for(tries - 1, retry_after)
                    } else {
                        None
                    };

                    match delay {
                        Some(delay) => {
                            tracing::debug!(
                                otp_id = %record.id,
                                channel = %channel,
                                tries = tries,
                                delay_ms = delay.as_millis() as u64,
                                reason = %reason,
                                "Transient delivery failure, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::warn!(
                                otp_id = %record.id,
                                channel = %channel,
                                destination = %masked,
                                tries = tries,
                                reason = %reason,
                                event = "otp_delivery_exhausted",
                                "Delivery retries exhausted"
                            );
                            attempt.mark_failed(reason.clone(), tries, self.clock.now())?;
                            break Some(DeliveryFailure::Transient { reason });
                        }
                    }
                }
            }
        };

        // The adapter outcome stands even if it cannot be written back; the
        // stored attempt then stays pending
        if let Err(e) = with_timeout(
            self.store_timeout,
            "store.update_delivery",
            self.store.update_delivery(&attempt),
        )
        .await
        {
            tracing::error!(
                otp_id = %record.id,
                attempt_id = %attempt.id,
                channel = %channel,
                status = ?attempt.status,
                error = %e,
                event = "otp_delivery_update_failed",
                "Failed to record delivery outcome"
            );
        }

        Ok(DispatchReport { attempt, failure })
    }
}

/// Whole minutes left on the code, rounded up, at least 1
fn minutes_left(record: &OtpRecord, now: chrono::DateTime<chrono::Utc>) -> u64 {
    let seconds = (record.expires_at - now).num_seconds().max(0) as u64;
    ((seconds + 59) / 60).max(1)
}
