use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use otp_core::domain::entities::DeliveryStatus;
use otp_core::domain::value_objects::Channel;
use otp_core::services::{DeliverySummary, RequestOutcome, ResendOutcome, VerifyOutcome};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RequestOtpRequest {
    /// E.164 phone number, email address or Telegram chat id
    #[validate(length(min = 1, max = 254))]
    pub identity: String,

    /// Scope of the code, e.g. "login" or "reset_password"
    #[validate(length(min = 1, max = 64))]
    pub purpose: String,

    pub channel: Channel,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(length(min = 1, max = 254))]
    pub identity: String,

    #[validate(length(min = 1, max = 64))]
    pub purpose: String,

    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResendOtpRequest {
    #[validate(length(min = 1, max = 254))]
    pub identity: String,

    #[validate(length(min = 1, max = 64))]
    pub purpose: String,

    /// Alternate channel; the original one when absent
    #[serde(default)]
    pub channel: Option<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryDto {
    pub status: DeliveryStatus,
    pub channel: Channel,
}

impl From<DeliverySummary> for DeliveryDto {
    fn from(summary: DeliverySummary) -> Self {
        Self {
            status: summary.status,
            channel: summary.channel,
        }
    }
}

/// Body of a successful request: `status` is always "issued"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedResponse {
    pub status: String,
    pub otp_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub delivery: DeliveryDto,
}

impl From<RequestOutcome> for IssuedResponse {
    fn from(outcome: RequestOutcome) -> Self {
        Self {
            status: "issued".to_string(),
            otp_id: outcome.otp_id,
            expires_at: outcome.expires_at,
            delivery: outcome.delivery.into(),
        }
    }
}

/// Body of a resend: "resent" with delivery details, or "denied"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryDto>,
}

impl ResendResponse {
    pub fn denied() -> Self {
        Self {
            status: "denied".to_string(),
            expires_at: None,
            delivery: None,
        }
    }
}

impl From<ResendOutcome> for ResendResponse {
    fn from(outcome: ResendOutcome) -> Self {
        Self {
            status: "resent".to_string(),
            expires_at: Some(outcome.expires_at),
            delivery: Some(outcome.delivery.into()),
        }
    }
}

/// Verify result; `remaining_attempts` only accompanies "invalid"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        let (status, remaining_attempts) = match outcome {
            VerifyOutcome::Valid => ("valid", None),
            VerifyOutcome::Invalid { remaining_attempts } => ("invalid", Some(remaining_attempts)),
            VerifyOutcome::Expired => ("expired", None),
            VerifyOutcome::LockedOut => ("locked_out", None),
        };
        Self {
            status: status.to_string(),
            remaining_attempts,
        }
    }
}
