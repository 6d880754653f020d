//! One-time password record entity.

use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::value_objects::Channel;
use crate::errors::DomainError;

/// Failed verifications before a code is locked out
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lifetime of a code in seconds
pub const DEFAULT_TTL_SECONDS: i64 = 300;

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpState {
    Active,
    Consumed,
    Expired,
    LockedOut,
    Superseded,
}

impl OtpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpState::Active => "active",
            OtpState::Consumed => "consumed",
            OtpState::Expired => "expired",
            OtpState::LockedOut => "locked_out",
            OtpState::Superseded => "superseded",
        }
    }

    /// Every state except `Active` is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OtpState::Active)
    }
}

impl fmt::Display for OtpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OtpState::Active),
            "consumed" => Ok(OtpState::Consumed),
            "expired" => Ok(OtpState::Expired),
            "locked_out" => Ok(OtpState::LockedOut),
            "superseded" => Ok(OtpState::Superseded),
            other => Err(DomainError::Internal {
                message: format!("Unknown OTP state: {}", other),
            }),
        }
    }
}

/// AES-GCM protected copy of the code, kept so a resend can re-deliver it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCipher {
    /// Ciphertext with authentication tag (base64 encoded)
    pub ciphertext: String,
    /// Nonce used for encryption (base64 encoded)
    pub nonce: String,
    /// Key ID used for encryption
    pub key_id: String,
}

/// Result of presenting a code to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Code matched; the record is now consumed
    Valid,
    /// The record outlived its expiry
    Expired,
    /// Wrong code; `attempts` failures so far
    Mismatch { attempts: u32, remaining: u32 },
    /// The newest record was already consumed
    AlreadyConsumed,
    /// Too many failed attempts on this record
    LockedOut,
    /// No record exists for the identity and purpose
    NotFound,
}

/// Persisted one-time password
///
/// The plaintext code is never stored. `code_hash` is the SHA-256 of the record
/// id and the code, which is what verification compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub id: Uuid,
    pub identity: String,
    pub purpose: String,
    pub channel: Channel,
    pub code_hash: String,
    pub code_cipher: CodeCipher,
    pub state: OtpState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl OtpRecord {
    /// Creates a new active record for `code`, valid for `ttl` from `now`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: impl Into<String>,
        purpose: impl Into<String>,
        channel: Channel,
        code: &str,
        code_cipher: CodeCipher,
        ttl: Duration,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            identity: identity.into(),
            purpose: purpose.into(),
            channel,
            code_hash: Self::hash_code(id, code),
            code_cipher,
            state: OtpState::Active,
            attempts: 0,
            max_attempts,
            created_at: now,
            expires_at: now + ttl,
            consumed_at: None,
        }
    }

    /// SHA-256 of the record id and code, hex encoded
    pub fn hash_code(id: Uuid, code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(b":");
        hasher.update(code.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Constant-time comparison of a supplied code against the stored hash
    pub fn matches(&self, supplied: &str) -> bool {
        let candidate = Self::hash_code(self.id, supplied);
        constant_time_eq(candidate.as_bytes(), self.code_hash.as_bytes())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Active and not yet past its expiry
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.state == OtpState::Active && !self.is_expired_at(now)
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Lazily moves an active record past its expiry to `Expired`.
    /// Returns true when the state changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == OtpState::Active && self.is_expired_at(now) {
            self.state = OtpState::Expired;
            return true;
        }
        false
    }

    pub fn supersede(&mut self) {
        if self.state == OtpState::Active {
            self.state = OtpState::Superseded;
        }
    }

    /// Evaluates a verification attempt and applies the resulting transition.
    ///
    /// Callers must hold the record exclusively (row lock or store mutex) for
    /// the read, this call and the write-back.
    pub fn apply_attempt(&mut self, supplied: &str, now: DateTime<Utc>) -> ConsumeOutcome {
        match self.state {
            OtpState::Consumed => return ConsumeOutcome::AlreadyConsumed,
            OtpState::LockedOut => return ConsumeOutcome::LockedOut,
            OtpState::Expired => return ConsumeOutcome::Expired,
            OtpState::Superseded => return ConsumeOutcome::NotFound,
            OtpState::Active => {}
        }

        if self.expire_if_due(now) {
            return ConsumeOutcome::Expired;
        }

        if self.matches(supplied) {
            self.state = OtpState::Consumed;
            self.consumed_at = Some(now);
            return ConsumeOutcome::Valid;
        }

        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            self.state = OtpState::LockedOut;
            return ConsumeOutcome::LockedOut;
        }

        ConsumeOutcome::Mismatch {
            attempts: self.attempts,
            remaining: self.remaining_attempts(),
        }
    }
}
