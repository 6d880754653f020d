//! Mapping from identities to channel addresses

use otp_shared::utils::{identity, phone, validation};

use crate::domain::value_objects::Channel;
use crate::errors::{DomainError, DomainResult};

/// Resolves where a code for `identity` is sent on `channel`
pub trait DestinationResolver: Send + Sync {
    fn resolve(&self, identity: &str, channel: Channel) -> DomainResult<String>;
}

/// Treats the identity itself as the address: an E.164 number for SMS,
/// a mailbox for email, a chat id for Telegram.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDestinationResolver;

impl DestinationResolver for IdentityDestinationResolver {
    fn resolve(&self, identity_value: &str, channel: Channel) -> DomainResult<String> {
        let value = identity_value.trim();
        match channel {
            Channel::Sms if phone::is_valid_e164(value) => Ok(phone::normalize_phone_number(value)),
            Channel::Sms => Err(DomainError::invalid(
                "identity",
                "SMS delivery requires an E.164 phone number",
            )),
            Channel::Email if validation::is_valid_email(value) => Ok(value.to_string()),
            Channel::Email => Err(DomainError::invalid(
                "identity",
                "email delivery requires a valid email address",
            )),
            Channel::Telegram if identity::is_valid_telegram_chat_id(value) => Ok(value.to_string()),
            Channel::Telegram => Err(DomainError::invalid(
                "identity",
                "Telegram delivery requires a numeric chat id",
            )),
        }
    }
}
