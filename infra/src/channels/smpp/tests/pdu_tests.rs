//! PDU layout, framing and failure classification

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use otp_core::services::DeliveryResult;

use crate::channels::smpp::adapter::classify;
use crate::channels::smpp::pdu::{
    command, encode_text, status, BindTransceiver, Pdu, PduBody, ShortMessage, DATA_CODING_IA5,
    DATA_CODING_UCS2, INTERFACE_VERSION,
};
use crate::channels::smpp::{SmppCodec, SmppError};

fn bind_pdu() -> Pdu {
    Pdu::request(
        7,
        PduBody::BindTransceiver(BindTransceiver {
            system_id: "otp".to_string(),
            password: "secret".to_string(),
            system_type: String::new(),
            interface_version: INTERFACE_VERSION,
            addr_ton: 0,
            addr_npi: 0,
            address_range: String::new(),
        }),
    )
}

#[test]
fn test_bind_header_layout() {
    let mut buf = BytesMut::new();
    bind_pdu().encode(&mut buf).unwrap();

    // 16 header + "otp\0" + "secret\0" + "\0" + 3 octets + "\0"
    assert_eq!(buf.len(), 16 + 4 + 7 + 1 + 3 + 1);
    assert_eq!(&buf[0..4], &(buf.len() as u32).to_be_bytes());
    assert_eq!(&buf[4..8], &command::BIND_TRANSCEIVER.to_be_bytes());
    assert_eq!(&buf[8..12], &[0, 0, 0, 0]);
    assert_eq!(&buf[12..16], &7u32.to_be_bytes());
    assert_eq!(&buf[16..20], b"otp\0");
}

#[test]
fn test_bind_decodes_back() {
    let pdu = bind_pdu();
    let mut buf = BytesMut::new();
    pdu.encode(&mut buf).unwrap();
    assert_eq!(Pdu::decode(buf.freeze()).unwrap(), pdu);
}

#[test]
fn test_error_responses_without_body() {
    let mut buf = BytesMut::new();
    buf.put_u32(16);
    buf.put_u32(command::BIND_TRANSCEIVER_RESP);
    buf.put_u32(status::ESME_RINVPASWD);
    buf.put_u32(1);

    let pdu = Pdu::decode(buf.freeze()).unwrap();
    assert_eq!(pdu.command_status, status::ESME_RINVPASWD);
    assert_eq!(
        pdu.body,
        PduBody::BindTransceiverResp {
            system_id: String::new()
        }
    );
    assert!(pdu.is_response());
}

#[test]
fn test_submit_sm_resp_carries_message_id() {
    let mut buf = BytesMut::new();
    buf.put_u32(16 + 6);
    buf.put_u32(command::SUBMIT_SM_RESP);
    buf.put_u32(0);
    buf.put_u32(42);
    buf.put_slice(b"ab12c\0");

    let pdu = Pdu::decode(buf.freeze()).unwrap();
    assert_eq!(pdu.sequence_number, 42);
    assert_eq!(
        pdu.body,
        PduBody::SubmitSmResp {
            message_id: "ab12c".to_string()
        }
    );
}

#[test]
fn test_unknown_commands_are_preserved() {
    let mut buf = BytesMut::new();
    buf.put_u32(18);
    buf.put_u32(0x0000_0103);
    buf.put_u32(0);
    buf.put_u32(3);
    buf.put_slice(&[1, 2]);

    let pdu = Pdu::decode(buf.freeze()).unwrap();
    assert_eq!(
        pdu.body,
        PduBody::Unknown {
            command_id: 0x0000_0103,
            body: Bytes::from_static(&[1, 2])
        }
    );
}

#[test]
fn test_text_encoding() {
    let (coding, payload) = encode_text("Your code is 482913").unwrap();
    assert_eq!(coding, DATA_CODING_IA5);
    assert_eq!(&payload[..], b"Your code is 482913");

    let (coding, payload) = encode_text("Código 482913").unwrap();
    assert_eq!(coding, DATA_CODING_UCS2);
    assert_eq!(payload.len(), 13 * 2);
    assert_eq!(&payload[0..2], &[0x00, b'C']);

    assert!(matches!(
        encode_text(&"x".repeat(255)),
        Err(SmppError::MessageTooLong(255))
    ));
}

#[test]
fn test_oversized_destination_is_rejected() {
    let (coding, payload) = encode_text("hi").unwrap();
    let sm = ShortMessage::text("OTP", 5, 0, "1".repeat(21), coding, payload);
    let mut buf = BytesMut::new();
    let err = Pdu::request(1, PduBody::SubmitSm(sm)).encode(&mut buf).unwrap_err();
    assert!(matches!(
        err,
        SmppError::FieldTooLong {
            field: "destination_addr",
            ..
        }
    ));
}

#[test]
fn test_codec_waits_for_complete_frame() {
    let mut encoded = BytesMut::new();
    SmppCodec
        .encode(Pdu::request(9, PduBody::EnquireLink), &mut encoded)
        .unwrap();
    assert_eq!(encoded.len(), 16);

    let mut partial = BytesMut::from(&encoded[..10]);
    assert!(SmppCodec.decode(&mut partial).unwrap().is_none());

    partial.extend_from_slice(&encoded[10..]);
    let pdu = SmppCodec.decode(&mut partial).unwrap().unwrap();
    assert_eq!(pdu.body, PduBody::EnquireLink);
    assert_eq!(pdu.sequence_number, 9);
    assert!(partial.is_empty());
}

#[test]
fn test_codec_rejects_bad_length() {
    let mut buf = BytesMut::new();
    buf.put_u32(8);
    buf.put_u32(command::ENQUIRE_LINK);
    assert!(matches!(
        SmppCodec.decode(&mut buf),
        Err(SmppError::InvalidLength(8))
    ));
}

#[test]
fn test_failure_classification() {
    assert_eq!(
        classify(SmppError::Status(status::ESME_RINVDSTADR)),
        DeliveryResult::rejected_address("SMSC rejected destination address")
    );
    assert!(matches!(
        classify(SmppError::Status(status::ESME_RTHROTTLED)),
        DeliveryResult::TransientFailure { .. }
    ));
    assert!(matches!(
        classify(SmppError::Status(status::ESME_RX_P_APPN)),
        DeliveryResult::PermanentFailure {
            address_rejected: false,
            ..
        }
    ));
    assert!(matches!(
        classify(SmppError::BindRejected(status::ESME_RBINDFAIL)),
        DeliveryResult::PermanentFailure {
            address_rejected: false,
            ..
        }
    ));
    assert!(matches!(
        classify(SmppError::Timeout(5)),
        DeliveryResult::TransientFailure { .. }
    ));
    assert!(matches!(
        classify(SmppError::Closed),
        DeliveryResult::TransientFailure { .. }
    ));
}
