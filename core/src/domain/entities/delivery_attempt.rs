//! Delivery attempt entity recording one dispatch of a code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::value_objects::Channel;
use crate::errors::{DomainError, DomainResult};

/// Delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    /// Permanently rejected destination address
    Bounced,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Bounced => "bounced",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            "bounced" => Ok(DeliveryStatus::Bounced),
            other => Err(DomainError::Internal {
                message: format!("Unknown delivery status: {}", other),
            }),
        }
    }
}

/// One dispatch of a code through a channel. Immutable once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub otp_id: Uuid,
    pub channel: Channel,
    pub status: DeliveryStatus,
    /// Adapter invocations made so far
    pub tries: u32,
    pub provider_message_id: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Creates a pending attempt
    pub fn new(otp_id: Uuid, channel: Channel, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            otp_id,
            channel,
            status: DeliveryStatus::Pending,
            tries: 0,
            provider_message_id: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_sent(
        &mut self,
        provider_message_id: impl Into<String>,
        tries: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.finish(DeliveryStatus::Sent, tries, now)?;
        self.provider_message_id = Some(provider_message_id.into());
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        tries: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.finish(DeliveryStatus::Failed, tries, now)?;
        self.error_detail = Some(reason.into());
        Ok(())
    }

    pub fn mark_bounced(
        &mut self,
        reason: impl Into<String>,
        tries: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.finish(DeliveryStatus::Bounced, tries, now)?;
        self.error_detail = Some(reason.into());
        Ok(())
    }

    fn finish(&mut self, status: DeliveryStatus, tries: u32, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::Internal {
                message: format!(
                    "Delivery attempt {} is already {}",
                    self.id, self.status
                ),
            });
        }
        self.status = status;
        self.tries = tries;
        self.updated_at = now;
        Ok(())
    }
}
