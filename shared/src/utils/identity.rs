//! Channel-agnostic identity helpers

use super::phone::{looks_like_phone, mask_phone, normalize_phone_number};
use super::validation::mask_email;

/// Canonical form used as the storage key: phone numbers lose their
/// formatting, email addresses are lower-cased, anything else is trimmed.
pub fn canonicalize_identity(identity: &str) -> String {
    let trimmed = identity.trim();
    if looks_like_phone(trimmed) {
        normalize_phone_number(trimmed)
    } else if trimmed.contains('@') {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Check if a string is a Telegram chat id (signed 64-bit integer)
pub fn is_valid_telegram_chat_id(chat_id: &str) -> bool {
    let digits = chat_id.strip_prefix('-').unwrap_or(chat_id);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) && chat_id.parse::<i64>().is_ok()
}

/// Mask any identity for logs: phones and emails keep their shape,
/// everything else keeps only the last two characters.
pub fn mask_identity(identity: &str) -> String {
    if identity.contains('@') {
        return mask_email(identity);
    }
    if looks_like_phone(identity) {
        return mask_phone(identity);
    }

    let chars: Vec<char> = identity.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("****{}", tail)
}
