//! Transport-agnostic delivery contract

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::value_objects::Channel;

/// Message ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Subject line, for channels that have one
    pub subject: Option<String>,
    pub body: String,
}

/// Outcome of a single send, classified by the adapter that made it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered {
        provider_message_id: String,
    },
    /// Worth retrying; `retry_after` carries a provider hint if one was given
    TransientFailure {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Retrying cannot help. `address_rejected` marks a bad destination,
    /// which is recorded as a bounce.
    PermanentFailure {
        reason: String,
        address_rejected: bool,
    },
}

impl DeliveryResult {
    pub fn transient(reason: impl Into<String>) -> Self {
        DeliveryResult::TransientFailure {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        DeliveryResult::PermanentFailure {
            reason: reason.into(),
            address_rejected: false,
        }
    }

    pub fn rejected_address(reason: impl Into<String>) -> Self {
        DeliveryResult::PermanentFailure {
            reason: reason.into(),
            address_rejected: true,
        }
    }
}

/// A single delivery transport (SMTP, SMPP, Telegram, mock)
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel this adapter serves
    fn channel(&self) -> Channel;

    /// Send one message. Failures are reported in the result, never as panics
    /// or errors, so the dispatcher can decide whether to retry.
    async fn send(&self, destination: &str, message: &RenderedMessage) -> DeliveryResult;
}
