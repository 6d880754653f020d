//! Email delivery through an SMTP relay
//!
//! SMTP replies are classified by their severity: 4xx is transient, 5xx is
//! permanent, and a 5.5.x mailbox rejection counts as a bad address.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::Category;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use otp_core::domain::value_objects::Channel;
use otp_core::services::{ChannelAdapter, DeliveryResult, RenderedMessage};
use otp_shared::config::EmailConfig;
use otp_shared::utils::mask_identity;

use crate::InfrastructureError;

const DEFAULT_SUBJECT: &str = "Your verification code";

pub struct EmailChannelAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    message_domain: String,
}

impl EmailChannelAdapter {
    /// Build the SMTP transport. No connection is made until the first send.
    pub fn new(config: &EmailConfig) -> Result<Self, InfrastructureError> {
        let from_address: Address = config.from_address.parse().map_err(|e| {
            InfrastructureError::Config(format!("invalid email.from_address: {}", e))
        })?;
        let message_domain = from_address.domain().to_string();
        let from = Mailbox::new(Some(config.from_name.clone()), from_address);

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| InfrastructureError::Email(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs.max(1))));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(
            smtp_host = %config.smtp_host,
            smtp_port = config.smtp_port,
            starttls = config.starttls,
            "Email channel configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
            message_domain,
        })
    }

    /// Assemble the message; `Err` carries a ready delivery result
    pub(crate) fn build_message(
        &self,
        destination: &str,
        message: &RenderedMessage,
    ) -> Result<(String, Message), DeliveryResult> {
        let to: Address = destination
            .parse()
            .map_err(|e| DeliveryResult::rejected_address(format!("invalid email address: {}", e)))?;

        let message_id = format!("<{}@{}>", Uuid::new_v4().simple(), self.message_domain);
        let email = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, to))
            .subject(message.subject.as_deref().unwrap_or(DEFAULT_SUBJECT))
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| DeliveryResult::permanent(format!("failed to build email: {}", e)))?;

        Ok((message_id, email))
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannelAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, destination: &str, message: &RenderedMessage) -> DeliveryResult {
        let (message_id, email) = match self.build_message(destination, message) {
            Ok(built) => built,
            Err(result) => return result,
        };

        match self.transport.send(email).await {
            Ok(response) => {
                debug!(
                    destination = %mask_identity(destination),
                    smtp_reply = %response.first_line().unwrap_or_default(),
                    "Email accepted by relay"
                );
                DeliveryResult::Delivered {
                    provider_message_id: message_id,
                }
            }
            Err(e) => {
                warn!(
                    destination = %mask_identity(destination),
                    error = %e,
                    "Email send failed"
                );
                classify(&e)
            }
        }
    }
}

fn classify(error: &lettre::transport::smtp::Error) -> DeliveryResult {
    if error.is_permanent() {
        let mailbox_rejected = error
            .status()
            .map(|code| matches!(code.category, Category::MailSystem))
            .unwrap_or(false);
        if mailbox_rejected {
            DeliveryResult::rejected_address(error.to_string())
        } else {
            DeliveryResult::permanent(error.to_string())
        }
    } else {
        // 4xx replies, timeouts and connection failures
        DeliveryResult::transient(error.to_string())
    }
}
