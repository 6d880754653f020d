//! Channel-specific message templates

use crate::domain::value_objects::Channel;

use crate::services::channel::RenderedMessage;

/// Renders the message carrying `code` for `channel`
pub fn render(channel: Channel, code: &str, expires_in_minutes: u64) -> RenderedMessage {
    let minutes = plural_minutes(expires_in_minutes);
    match channel {
        Channel::Email => RenderedMessage {
            subject: Some("Your verification code".to_string()),
            body: format!(
                "Your verification code is {code}\n\n\
                 It expires in {minutes}. If you did not request this code, \
                 you can ignore this email.",
            ),
        },
        // Kept under 70 characters so it fits one UCS-2 segment
        Channel::Sms => RenderedMessage {
            subject: None,
            body: format!("{code} is your verification code. Expires in {minutes}."),
        },
        Channel::Telegram => RenderedMessage {
            subject: None,
            body: format!("Your verification code: {code}\nIt expires in {minutes}."),
        },
    }
}

fn plural_minutes(minutes: u64) -> String {
    if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{} minutes", minutes)
    }
}
