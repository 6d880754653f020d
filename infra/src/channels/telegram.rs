//! Telegram delivery through the Bot API `sendMessage` method

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use otp_core::domain::value_objects::Channel;
use otp_core::services::{ChannelAdapter, DeliveryResult, RenderedMessage};
use otp_shared::config::TelegramConfig;
use otp_shared::utils::mask_identity;

use crate::InfrastructureError;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Bot API envelope; `result` is only read for the message id
#[derive(Debug, Deserialize)]
pub(crate) struct BotReply {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ReplyParameters>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ReplyParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

pub struct TelegramChannelAdapter {
    client: Client,
    send_url: String,
}

impl TelegramChannelAdapter {
    pub fn new(config: &TelegramConfig) -> Result<Self, InfrastructureError> {
        if config.bot_token.is_empty() {
            return Err(InfrastructureError::Config(
                "telegram.bot_token must be set".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            send_url: format!(
                "{}/bot{}/sendMessage",
                config.api_base_url.trim_end_matches('/'),
                config.bot_token
            ),
        })
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannelAdapter {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(&self, destination: &str, message: &RenderedMessage) -> DeliveryResult {
        let request = SendMessage {
            chat_id: destination,
            text: &message.body,
        };

        let response = match self.client.post(&self.send_url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                // The error text would include the token-bearing URL
                let e = e.without_url();
                warn!(chat = %mask_identity(destination), error = %e, "Telegram request failed");
                return DeliveryResult::transient(e.to_string());
            }
        };

        let status = response.status();
        let header_hint = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let reply = match response.json::<BotReply>().await {
            Ok(reply) => reply,
            // Gateway throttling in front of the Bot API answers without the JSON envelope
            Err(_) if status == StatusCode::TOO_MANY_REQUESTS => {
                warn!(chat = %mask_identity(destination), retry_after = ?header_hint, "Telegram throttled");
                return DeliveryResult::TransientFailure {
                    reason: format!("Telegram returned {}", status),
                    retry_after: header_hint,
                };
            }
            Err(_) if status.is_server_error() => {
                return DeliveryResult::transient(format!("Telegram returned {}", status));
            }
            Err(_) => {
                return DeliveryResult::permanent(format!("unexpected Telegram reply ({})", status));
            }
        };

        let result = classify(status, reply, header_hint);
        match &result {
            DeliveryResult::Delivered { provider_message_id } => debug!(
                chat = %mask_identity(destination),
                message_id = %provider_message_id,
                "Telegram message sent"
            ),
            other => warn!(chat = %mask_identity(destination), result = ?other, "Telegram send failed"),
        }
        result
    }
}

/// `header_hint` is the `Retry-After` header, used when the reply has no
/// `parameters.retry_after`
pub(crate) fn classify(status: StatusCode, reply: BotReply, header_hint: Option<Duration>) -> DeliveryResult {
    if reply.ok {
        let message_id = reply
            .result
            .map(|sent| sent.message_id.to_string())
            .unwrap_or_default();
        return DeliveryResult::Delivered {
            provider_message_id: message_id,
        };
    }

    let description = reply
        .description
        .unwrap_or_else(|| format!("Telegram returned {}", status));

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = reply
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs)
            .or(header_hint);
        return DeliveryResult::TransientFailure {
            reason: description,
            retry_after,
        };
    }

    if status.is_server_error() {
        return DeliveryResult::transient(description);
    }

    // Unknown chat, or a user who blocked the bot
    let lowered = description.to_lowercase();
    if status == StatusCode::FORBIDDEN || lowered.contains("chat not found") || lowered.contains("user not found") {
        return DeliveryResult::rejected_address(description);
    }

    DeliveryResult::permanent(description)
}
