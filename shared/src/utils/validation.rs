//! Email and purpose validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest identity accepted (RFC 5321 path limit)
pub const MAX_IDENTITY_LENGTH: usize = 254;
/// Longest purpose label accepted
pub const MAX_PURPOSE_LENGTH: usize = 64;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$").unwrap()
});

static PURPOSE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_.-]*$").unwrap());

/// Check if an email address is syntactically valid
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_IDENTITY_LENGTH && EMAIL_REGEX.is_match(email)
}

/// Check if a purpose label is valid (`login`, `password_reset`, `tx.confirm`)
pub fn is_valid_purpose(purpose: &str) -> bool {
    !purpose.is_empty() && purpose.len() <= MAX_PURPOSE_LENGTH && PURPOSE_REGEX.is_match(purpose)
}

/// Mask an email address for display (e.g., j***@example.com)
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}
