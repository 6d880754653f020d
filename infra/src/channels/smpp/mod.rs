//! SMS delivery over SMPP 3.4
//!
//! A single bound transceiver session is shared by all sends. The session
//! binds lazily, reconnects after transport failures and keeps the link
//! alive with `enquire_link`.

pub mod adapter;
pub mod codec;
pub mod pdu;
pub mod session;

#[cfg(test)]
mod tests;

pub use adapter::SmppChannelAdapter;
pub use codec::SmppCodec;
pub use pdu::{Pdu, PduBody};
pub use session::SmppSession;

use thiserror::Error;

/// Errors raised by the SMPP session and codec
#[derive(Error, Debug)]
pub enum SmppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDU length: {0}")]
    InvalidLength(usize),

    #[error("Malformed PDU: {0}")]
    Malformed(String),

    #[error("Field {field} exceeds {max} octets")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("SMSC returned status 0x{0:08X}")]
    Status(u32),

    #[error("Bind rejected with status 0x{0:08X}")]
    BindRejected(u32),

    #[error("No response within {0} seconds")]
    Timeout(u64),

    #[error("Connection closed by SMSC")]
    Closed,

    #[error("Message of {0} octets does not fit a single short message")]
    MessageTooLong(usize),
}

impl SmppError {
    /// Whether the session must be re-established after this error
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            SmppError::Io(_)
                | SmppError::InvalidLength(_)
                | SmppError::Malformed(_)
                | SmppError::Timeout(_)
                | SmppError::Closed
        )
    }
}
