//! Logging adapter used when `channels.use_mock` is set
//!
//! Messages are written to the log instead of being delivered, so a developer
//! can read the code from the console. Production config rejects `use_mock`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

use otp_core::domain::value_objects::Channel;
use otp_core::services::{ChannelAdapter, DeliveryResult, RenderedMessage};
use otp_shared::utils::mask_identity;

pub struct LoggingChannelAdapter {
    channel: Channel,
    sent: AtomicU64,
}

impl LoggingChannelAdapter {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: AtomicU64::new(0),
        }
    }

    /// Messages "delivered" so far
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelAdapter for LoggingChannelAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, destination: &str, message: &RenderedMessage) -> DeliveryResult {
        let message_id = format!("mock-{}", Uuid::new_v4().simple());
        self.sent.fetch_add(1, Ordering::SeqCst);

        info!(
            channel = %self.channel,
            destination = %mask_identity(destination),
            message_id = %message_id,
            subject = message.subject.as_deref().unwrap_or(""),
            body = %message.body,
            "Mock delivery"
        );

        DeliveryResult::Delivered {
            provider_message_id: message_id,
        }
    }
}
