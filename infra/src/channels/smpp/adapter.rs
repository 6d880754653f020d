//! `ChannelAdapter` for SMS over an SMPP session

use async_trait::async_trait;
use phonenumber::{country, Mode, PhoneNumber};
use std::sync::Arc;
use tracing::{debug, warn};

use otp_core::domain::value_objects::Channel;
use otp_core::services::{ChannelAdapter, DeliveryResult, RenderedMessage};
use otp_shared::config::SmppConfig;
use otp_shared::utils::mask_identity;

use super::pdu::{encode_text, status, ShortMessage};
use super::session::SmppSession;
use super::SmppError;

pub struct SmppChannelAdapter {
    session: Arc<SmppSession>,
}

impl SmppChannelAdapter {
    pub fn new(config: SmppConfig) -> Self {
        Self::with_session(Arc::new(SmppSession::new(config)))
    }

    pub fn with_session(session: Arc<SmppSession>) -> Self {
        Self { session }
    }

    /// Shared session, for the keepalive task
    pub fn session(&self) -> Arc<SmppSession> {
        self.session.clone()
    }

    /// International digits without the leading `+`, as SMPP expects
    /// with TON 1 / NPI 1
    fn destination_digits(&self, destination: &str) -> Result<String, String> {
        let region = self.session.config().default_region.parse::<country::Id>().ok();
        let parsed: PhoneNumber = phonenumber::parse(region, destination)
            .map_err(|e| format!("invalid phone number: {}", e))?;
        let e164 = parsed.format().mode(Mode::E164).to_string();
        Ok(e164.trim_start_matches('+').to_string())
    }

    fn build_message(&self, digits: String, text: &str) -> Result<ShortMessage, SmppError> {
        let config = self.session.config();
        let (data_coding, payload) = encode_text(text)?;
        Ok(ShortMessage::text(
            config.source_addr.clone(),
            config.source_addr_ton,
            config.source_addr_npi,
            digits,
            data_coding,
            payload,
        ))
    }
}

#[async_trait]
impl ChannelAdapter for SmppChannelAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, destination: &str, message: &RenderedMessage) -> DeliveryResult {
        let digits = match self.destination_digits(destination) {
            Ok(digits) => digits,
            Err(reason) => return DeliveryResult::rejected_address(reason),
        };

        let submit = match self.build_message(digits, &message.body) {
            Ok(submit) => submit,
            Err(e) => return classify(e),
        };

        match self.session.submit(submit).await {
            Ok(message_id) => {
                debug!(
                    destination = %mask_identity(destination),
                    message_id = %message_id,
                    "SMS accepted by SMSC"
                );
                DeliveryResult::Delivered {
                    provider_message_id: message_id,
                }
            }
            Err(e) => {
                warn!(
                    destination = %mask_identity(destination),
                    error = %e,
                    "SMS submit failed"
                );
                classify(e)
            }
        }
    }
}

/// Map an SMPP failure onto retry semantics
pub(crate) fn classify(error: SmppError) -> DeliveryResult {
    match error {
        SmppError::Status(code) => match code {
            status::ESME_RINVDSTADR => DeliveryResult::rejected_address("SMSC rejected destination address"),
            status::ESME_RTHROTTLED
            | status::ESME_RMSGQFUL
            | status::ESME_RSYSERR
            | status::ESME_RSUBMITFAIL
            | status::ESME_RX_T_APPN => DeliveryResult::transient(format!("SMSC status 0x{:08X}", code)),
            _ => DeliveryResult::permanent(format!("SMSC status 0x{:08X}", code)),
        },
        SmppError::FieldTooLong { field: "destination_addr", .. } => {
            DeliveryResult::rejected_address("destination address too long")
        }
        e @ (SmppError::BindRejected(_) | SmppError::MessageTooLong(_) | SmppError::FieldTooLong { .. }) => {
            DeliveryResult::permanent(e.to_string())
        }
        e => DeliveryResult::transient(e.to_string()),
    }
}
