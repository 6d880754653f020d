//! Result types returned by the OTP coordinator

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::{DeliveryAttempt, DeliveryStatus};
use crate::domain::value_objects::Channel;
use crate::errors::OtpError;

/// Delivery state reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliverySummary {
    pub status: DeliveryStatus,
    pub channel: Channel,
    /// Stored attempt; absent while a background dispatch has not started
    pub attempt_id: Option<Uuid>,
    pub tries: u32,
}

impl DeliverySummary {
    /// Summary for a dispatch handed off to a background task
    pub fn pending(channel: Channel) -> Self {
        Self {
            status: DeliveryStatus::Pending,
            channel,
            attempt_id: None,
            tries: 0,
        }
    }
}

impl From<&DeliveryAttempt> for DeliverySummary {
    fn from(attempt: &DeliveryAttempt) -> Self {
        Self {
            status: attempt.status,
            channel: attempt.channel,
            attempt_id: Some(attempt.id),
            tries: attempt.tries,
        }
    }
}

/// Result of issuing a code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestOutcome {
    pub otp_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub delivery: DeliverySummary,
}

/// Result of re-sending the active code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResendOutcome {
    pub otp_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub delivery: DeliverySummary,
}

/// Result of presenting a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Valid,
    Invalid { remaining_attempts: u32 },
    Expired,
    LockedOut,
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Valid)
    }

    /// The error a rejected verification corresponds to
    pub fn as_error(&self) -> Option<OtpError> {
        match *self {
            VerifyOutcome::Valid => None,
            VerifyOutcome::Invalid { remaining_attempts } => {
                Some(OtpError::CodeMismatch { remaining_attempts })
            }
            VerifyOutcome::Expired => Some(OtpError::CodeExpired),
            VerifyOutcome::LockedOut => Some(OtpError::CodeLockedOut),
        }
    }
}
