//! Delivery channel transport configuration

use serde::{Deserialize, Serialize};

/// Transport settings for every delivery channel
///
/// A channel without a section is not registered; requests for it fail with
/// `CHANNEL_UNAVAILABLE`. With `use_mock` every channel is served by the
/// logging mock adapter instead.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelsConfig {
    /// Replace all transports with the mock adapter
    #[serde(default)]
    pub use_mock: bool,

    /// SMTP settings
    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// SMPP gateway settings
    #[serde(default)]
    pub smpp: Option<SmppConfig>,

    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl ChannelsConfig {
    /// Mock delivery for every channel
    pub fn mock() -> Self {
        Self {
            use_mock: true,
            ..Default::default()
        }
    }
}

/// SMTP relay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Sender mailbox, e.g. `no-reply@example.com`
    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Upgrade the connection with STARTTLS
    #[serde(default = "default_true")]
    pub starttls: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
            starttls: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// SMPP v3.4 transceiver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmppConfig {
    #[serde(default = "default_smpp_host")]
    pub host: String,

    #[serde(default = "default_smpp_port")]
    pub port: u16,

    #[serde(default)]
    pub system_id: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub system_type: String,

    /// Sender id or short code
    #[serde(default = "default_source_addr")]
    pub source_addr: String,

    /// Type of number for the source address (5 = alphanumeric)
    #[serde(default = "default_source_ton")]
    pub source_addr_ton: u8,

    #[serde(default)]
    pub source_addr_npi: u8,

    /// Region used when a destination lacks a country code
    #[serde(default = "default_region")]
    pub default_region: String,

    #[serde(default = "default_enquire_link_secs")]
    pub enquire_link_interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SmppConfig {
    fn default() -> Self {
        Self {
            host: default_smpp_host(),
            port: default_smpp_port(),
            system_id: String::new(),
            password: String::new(),
            system_type: String::new(),
            source_addr: default_source_addr(),
            source_addr_ton: default_source_ton(),
            source_addr_npi: 0,
            default_region: default_region(),
            enquire_link_interval_secs: default_enquire_link_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SmppConfig {
    /// Socket address of the SMSC
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,

    #[serde(default = "default_telegram_api")]
    pub api_base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: default_telegram_api(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_smtp_host() -> String {
    String::from("localhost")
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    String::from("no-reply@localhost")
}

fn default_from_name() -> String {
    String::from("Verification")
}

fn default_smpp_host() -> String {
    String::from("localhost")
}

fn default_smpp_port() -> u16 {
    2775
}

fn default_source_addr() -> String {
    String::from("OTP")
}

fn default_source_ton() -> u8 {
    5
}

fn default_region() -> String {
    String::from("US")
}

fn default_enquire_link_secs() -> u64 {
    30
}

fn default_telegram_api() -> String {
    String::from("https://api.telegram.org")
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
