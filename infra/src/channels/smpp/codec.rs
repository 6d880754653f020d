//! Length-prefixed framing of SMPP PDUs for `tokio_util::codec::Framed`

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::pdu::{Pdu, HEADER_LEN, MAX_PDU_LEN};
use super::SmppError;

#[derive(Debug, Default, Clone, Copy)]
pub struct SmppCodec;

impl Decoder for SmppCodec {
    type Item = Pdu;
    type Error = SmppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Pdu>, SmppError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if !(HEADER_LEN..=MAX_PDU_LEN).contains(&length) {
            return Err(SmppError::InvalidLength(length));
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let frame = src.split_to(length).freeze();
        Pdu::decode(frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Pdu>, SmppError> {
        match self.decode(src)? {
            Some(pdu) => Ok(Some(pdu)),
            None if src.has_remaining() => Err(SmppError::Closed),
            None => Ok(None),
        }
    }
}

impl Encoder<Pdu> for SmppCodec {
    type Error = SmppError;

    fn encode(&mut self, pdu: Pdu, dst: &mut BytesMut) -> Result<(), SmppError> {
        pdu.encode(dst)
    }
}
