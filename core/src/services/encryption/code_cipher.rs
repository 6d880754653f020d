//! Code encryption using AES-256-GCM
//!
//! Records keep an encrypted copy of their code so a resend can deliver the
//! same code again. Verification never decrypts; it compares hashes.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;

use otp_shared::config::OtpConfig;

use crate::domain::entities::CodeCipher;
use crate::errors::{DomainError, DomainResult};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Trait defining code encryption operations
pub trait CodeEncryption: Send + Sync {
    /// Encrypt a code under the active key
    fn encrypt(&self, code: &str) -> DomainResult<CodeCipher>;

    /// Decrypt a code with the key it was sealed under
    fn decrypt(&self, sealed: &CodeCipher) -> DomainResult<String>;
}

/// AES-GCM implementation with a keyring of retired decryption keys
pub struct AesGcmCodeEncryption {
    active_key_id: String,
    keys: HashMap<String, [u8; KEY_LEN]>,
}

impl AesGcmCodeEncryption {
    /// Create with a specific key
    pub fn with_key(key_id: impl Into<String>, key: &[u8]) -> DomainResult<Self> {
        let key_id = key_id.into();
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), Self::key_bytes(key)?);
        Ok(Self {
            active_key_id: key_id,
            keys,
        })
    }

    /// Create with a freshly generated key. Codes sealed by another process
    /// cannot be decrypted, so this is only suitable for development and tests.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        let mut keys = HashMap::new();
        keys.insert("ephemeral".to_string(), key);
        Self {
            active_key_id: "ephemeral".to_string(),
            keys,
        }
    }

    /// Build from `otp.encryption_key` (base64), falling back to an ephemeral key
    pub fn from_config(config: &OtpConfig) -> DomainResult<Self> {
        match config.encryption_key.as_deref() {
            Some(encoded) => {
                let key = BASE64.decode(encoded.trim()).map_err(|e| {
                    DomainError::invalid("otp.encryption_key", format!("not valid base64: {}", e))
                })?;
                Self::with_key(config.encryption_key_id.clone(), &key)
            }
            None => {
                tracing::warn!(
                    event = "ephemeral_encryption_key",
                    "No otp.encryption_key configured; codes cannot be resent after a restart"
                );
                Ok(Self::ephemeral())
            }
        }
    }

    /// Keep an old key for decrypting codes sealed before a rotation
    pub fn with_retired_key(mut self, key_id: impl Into<String>, key: &[u8]) -> DomainResult<Self> {
        self.keys.insert(key_id.into(), Self::key_bytes(key)?);
        Ok(self)
    }

    pub fn active_key_id(&self) -> &str {
        &self.active_key_id
    }

    fn key_bytes(key: &[u8]) -> DomainResult<[u8; KEY_LEN]> {
        key.try_into().map_err(|_| {
            DomainError::invalid(
                "otp.encryption_key",
                format!("expected {} bytes, got {}", KEY_LEN, key.len()),
            )
        })
    }

    fn cipher_for(&self, key_id: &str) -> DomainResult<Aes256Gcm> {
        let key = self.keys.get(key_id).ok_or_else(|| DomainError::Internal {
            message: format!("Unknown encryption key id: {}", key_id),
        })?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
    }

    /// Generate a random nonce for AES-GCM
    fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

impl CodeEncryption for AesGcmCodeEncryption {
    fn encrypt(&self, code: &str) -> DomainResult<CodeCipher> {
        let cipher = self.cipher_for(&self.active_key_id)?;
        let nonce = Self::generate_nonce();

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), code.as_bytes())
            .map_err(|e| DomainError::Internal {
                message: format!("Encryption failed: {}", e),
            })?;

        Ok(CodeCipher {
            ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce),
            key_id: self.active_key_id.clone(),
        })
    }

    fn decrypt(&self, sealed: &CodeCipher) -> DomainResult<String> {
        let cipher = self.cipher_for(&sealed.key_id)?;

        let ciphertext = BASE64
            .decode(&sealed.ciphertext)
            .map_err(|e| DomainError::Internal {
                message: format!("Failed to decode ciphertext: {}", e),
            })?;

        let nonce = BASE64
            .decode(&sealed.nonce)
            .map_err(|e| DomainError::Internal {
                message: format!("Failed to decode nonce: {}", e),
            })?;

        if nonce.len() != NONCE_LEN {
            return Err(DomainError::Internal {
                message: "Invalid nonce size for AES-GCM".to_string(),
            });
        }

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|e| DomainError::Internal {
                message: format!("Decryption failed: {}", e),
            })?;

        String::from_utf8(plaintext).map_err(|e| DomainError::Internal {
            message: format!("Decrypted code is not UTF-8: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_code() {
        let service = AesGcmCodeEncryption::with_key("k1", &[7u8; 32]).unwrap();

        let sealed = service.encrypt("123456").unwrap();
        assert_eq!(sealed.key_id, "k1");
        assert_ne!(sealed.ciphertext, "123456");
        assert_eq!(service.decrypt(&sealed).unwrap(), "123456");
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let service = AesGcmCodeEncryption::ephemeral();
        let first = service.encrypt("123456").unwrap();
        let second = service.encrypt("123456").unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let service = AesGcmCodeEncryption::ephemeral();
        let mut sealed = service.encrypt("123456").unwrap();
        let mut raw = BASE64.decode(&sealed.ciphertext).unwrap();
        raw[0] ^= 0xff;
        sealed.ciphertext = BASE64.encode(raw);

        assert!(service.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_retired_key_still_decrypts() {
        let old = AesGcmCodeEncryption::with_key("k1", &[1u8; 32]).unwrap();
        let sealed = old.encrypt("424242").unwrap();

        let rotated = AesGcmCodeEncryption::with_key("k2", &[2u8; 32])
            .unwrap()
            .with_retired_key("k1", &[1u8; 32])
            .unwrap();
        assert_eq!(rotated.active_key_id(), "k2");
        assert_eq!(rotated.decrypt(&sealed).unwrap(), "424242");
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(AesGcmCodeEncryption::with_key("k1", &[0u8; 16]).is_err());
    }

    #[test]
    fn test_from_config_decodes_base64_key() {
        let config = OtpConfig {
            encryption_key: Some(BASE64.encode([9u8; 32])),
            encryption_key_id: "prod-1".to_string(),
            ..OtpConfig::default()
        };
        let service = AesGcmCodeEncryption::from_config(&config).unwrap();
        assert_eq!(service.active_key_id(), "prod-1");

        let config = OtpConfig {
            encryption_key: Some("not base64!".to_string()),
            ..OtpConfig::default()
        };
        assert!(AesGcmCodeEncryption::from_config(&config).is_err());
    }
}
