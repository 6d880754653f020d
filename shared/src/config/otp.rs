//! OTP issuance configuration module

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Shortest code the service will issue
pub const MIN_CODE_LENGTH: usize = 4;
/// Longest code the service will issue
pub const MAX_CODE_LENGTH: usize = 32;

/// Code generation, expiry, encryption and delivery policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OtpConfig {
    /// Number of characters in a generated code
    #[serde(default = "default_code_length")]
    pub code_length: usize,

    /// Alphabet codes are drawn from
    #[serde(default)]
    pub alphabet: AlphabetKind,

    /// Characters used when `alphabet = "custom"`
    #[serde(default)]
    pub custom_alphabet: Option<String>,

    /// Code lifetime in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Failed verifications before the code is locked out
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound for a single store operation in seconds
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    /// Whether requests wait for the delivery outcome
    #[serde(default)]
    pub dispatch_mode: DispatchMode,

    /// Base64 encoded 32-byte AES key protecting codes at rest.
    /// A random per-process key is generated when absent (development only).
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Identifier stored next to every ciphertext
    #[serde(default = "default_encryption_key_id")]
    pub encryption_key_id: String,

    /// Delivery retry policy
    #[serde(default)]
    pub delivery: DeliveryRetryConfig,

    /// Interval between expired record sweeps in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How long finished records are retained before purging, in hours
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

/// Alphabet selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphabetKind {
    Numeric,
    Alphanumeric,
    Custom,
}

impl Default for AlphabetKind {
    fn default() -> Self {
        AlphabetKind::Numeric
    }
}

/// Dispatch mode for request/resend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Wait for the adapter outcome before responding
    Inline,
    /// Respond immediately; delivery is recorded asynchronously
    Background,
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Inline
    }
}

/// Retry policy for channel adapters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryRetryConfig {
    /// Adapter invocations per dispatch, including the first
    #[serde(default = "default_delivery_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Longest provider `retry-after` hint still waited out, in milliseconds
    #[serde(default = "default_max_hint_delay_ms")]
    pub max_hint_delay_ms: u64,

    /// Per-call adapter timeout in seconds
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
}

impl Default for DeliveryRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_delivery_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_hint_delay_ms: default_max_hint_delay_ms(),
            adapter_timeout_secs: default_adapter_timeout_secs(),
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: default_code_length(),
            alphabet: AlphabetKind::default(),
            custom_alphabet: None,
            ttl_seconds: default_ttl_seconds(),
            max_attempts: default_max_attempts(),
            store_timeout_secs: default_store_timeout_secs(),
            dispatch_mode: DispatchMode::default(),
            encryption_key: None,
            encryption_key_id: default_encryption_key_id(),
            delivery: DeliveryRetryConfig::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl OtpConfig {
    /// Validate generation and retry settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: String| ConfigError::Invalid {
            field: field.to_string(),
            message,
        };

        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&self.code_length) {
            return Err(invalid(
                "otp.code_length",
                format!("must be between {} and {}", MIN_CODE_LENGTH, MAX_CODE_LENGTH),
            ));
        }

        if self.alphabet == AlphabetKind::Custom {
            let distinct = self
                .custom_alphabet
                .as_deref()
                .map(|chars| {
                    let mut seen: Vec<char> = chars.chars().collect();
                    seen.sort_unstable();
                    seen.dedup();
                    seen.len()
                })
                .unwrap_or(0);
            if distinct < 2 {
                return Err(invalid(
                    "otp.custom_alphabet",
                    "custom alphabet needs at least 2 distinct characters".to_string(),
                ));
            }
        }

        if self.ttl_seconds == 0 {
            return Err(invalid("otp.ttl_seconds", "must be positive".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(invalid("otp.max_attempts", "must be at least 1".to_string()));
        }
        if self.delivery.max_attempts == 0 {
            return Err(invalid("otp.delivery.max_attempts", "must be at least 1".to_string()));
        }
        if self.delivery.base_delay_ms > self.delivery.max_delay_ms {
            return Err(invalid(
                "otp.delivery.base_delay_ms",
                "must not exceed max_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Code lifetime in whole minutes, rounded up, for message templates
    pub fn ttl_minutes(&self) -> u64 {
        (self.ttl_seconds + 59) / 60
    }
}

fn default_code_length() -> usize {
    6
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_store_timeout_secs() -> u64 {
    5
}

fn default_encryption_key_id() -> String {
    String::from("k1")
}

fn default_delivery_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_max_hint_delay_ms() -> u64 {
    30_000
}

fn default_adapter_timeout_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_retention_hours() -> u64 {
    24
}
