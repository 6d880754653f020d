//! Delivery channel transports
//!
//! - `email` - SMTP through lettre
//! - `smpp` - SMS over an SMPP 3.4 transceiver session
//! - `telegram` - Bot API over reqwest
//! - `logging` - development stand-in that logs instead of sending

pub mod email;
pub mod logging;
pub mod smpp;
pub mod telegram;

pub use email::EmailChannelAdapter;
pub use logging::LoggingChannelAdapter;
pub use smpp::{SmppChannelAdapter, SmppSession};
pub use telegram::TelegramChannelAdapter;

use std::sync::Arc;
use tracing::{info, warn};

use otp_core::domain::value_objects::Channel;
use otp_core::services::ChannelAdapter;
use otp_shared::config::ChannelsConfig;

use crate::InfrastructureError;

/// Adapters built from configuration
pub struct ChannelSet {
    pub adapters: Vec<Arc<dyn ChannelAdapter>>,
    /// Present when SMS goes over SMPP; owns the keepalive
    pub smpp_session: Option<Arc<SmppSession>>,
}

impl ChannelSet {
    pub fn channels(&self) -> Vec<Channel> {
        self.adapters.iter().map(|a| a.channel()).collect()
    }
}

/// Build one adapter per configured channel. Channels without a section
/// stay unregistered.
pub fn build_adapters(config: &ChannelsConfig) -> Result<ChannelSet, InfrastructureError> {
    if config.use_mock {
        warn!("Using mock delivery for all channels");
        return Ok(ChannelSet {
            adapters: Channel::ALL
                .into_iter()
                .map(|channel| Arc::new(LoggingChannelAdapter::new(channel)) as Arc<dyn ChannelAdapter>)
                .collect(),
            smpp_session: None,
        });
    }

    let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();
    let mut smpp_session = None;

    if let Some(email) = &config.email {
        adapters.push(Arc::new(EmailChannelAdapter::new(email)?));
    }
    if let Some(smpp) = &config.smpp {
        let adapter = SmppChannelAdapter::new(smpp.clone());
        smpp_session = Some(adapter.session());
        adapters.push(Arc::new(adapter));
    }
    if let Some(telegram) = &config.telegram {
        adapters.push(Arc::new(TelegramChannelAdapter::new(telegram)?));
    }

    let set = ChannelSet {
        adapters,
        smpp_session,
    };
    info!(channels = ?set.channels(), "Delivery channels configured");
    Ok(set)
}
