//! SMPP 3.4 protocol data units
//!
//! Only the operations an ESME needs for submitting short messages are
//! modelled; anything else decodes to `PduBody::Unknown` and is ignored.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::SmppError;

/// command_length + command_id + command_status + sequence_number
pub const HEADER_LEN: usize = 16;
/// Upper bound accepted from the wire
pub const MAX_PDU_LEN: usize = 64 * 1024;
/// Longest `short_message` payload
pub const MAX_SHORT_MESSAGE_LEN: usize = 254;

pub const INTERFACE_VERSION: u8 = 0x34;

/// IA5 (ASCII) text
pub const DATA_CODING_IA5: u8 = 0x01;
/// UCS-2 big endian text
pub const DATA_CODING_UCS2: u8 = 0x08;

/// Command identifiers
pub mod command {
    pub const GENERIC_NACK: u32 = 0x8000_0000;
    pub const BIND_TRANSCEIVER: u32 = 0x0000_0009;
    pub const BIND_TRANSCEIVER_RESP: u32 = 0x8000_0009;
    pub const SUBMIT_SM: u32 = 0x0000_0004;
    pub const SUBMIT_SM_RESP: u32 = 0x8000_0004;
    pub const DELIVER_SM: u32 = 0x0000_0005;
    pub const DELIVER_SM_RESP: u32 = 0x8000_0005;
    pub const UNBIND: u32 = 0x0000_0006;
    pub const UNBIND_RESP: u32 = 0x8000_0006;
    pub const ENQUIRE_LINK: u32 = 0x0000_0015;
    pub const ENQUIRE_LINK_RESP: u32 = 0x8000_0015;

    /// Responses carry the high bit
    pub const RESPONSE_MASK: u32 = 0x8000_0000;
}

/// command_status values the adapter distinguishes
pub mod status {
    pub const ESME_ROK: u32 = 0x0000_0000;
    pub const ESME_RINVMSGLEN: u32 = 0x0000_0001;
    pub const ESME_RSYSERR: u32 = 0x0000_0008;
    pub const ESME_RINVSRCADR: u32 = 0x0000_000A;
    pub const ESME_RINVDSTADR: u32 = 0x0000_000B;
    pub const ESME_RBINDFAIL: u32 = 0x0000_000D;
    pub const ESME_RINVPASWD: u32 = 0x0000_000E;
    pub const ESME_RMSGQFUL: u32 = 0x0000_0014;
    pub const ESME_RSUBMITFAIL: u32 = 0x0000_0045;
    pub const ESME_RTHROTTLED: u32 = 0x0000_0058;
    pub const ESME_RX_T_APPN: u32 = 0x0000_0064;
    pub const ESME_RX_P_APPN: u32 = 0x0000_0065;
}

// Maximum sizes of C-octet strings, including the NUL terminator
const SYSTEM_ID_MAX: usize = 16;
const PASSWORD_MAX: usize = 9;
const SYSTEM_TYPE_MAX: usize = 13;
const ADDRESS_RANGE_MAX: usize = 41;
const SERVICE_TYPE_MAX: usize = 6;
const ADDR_MAX: usize = 21;
const TIME_MAX: usize = 17;
const MESSAGE_ID_MAX: usize = 65;

/// bind_transceiver parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindTransceiver {
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub interface_version: u8,
    pub addr_ton: u8,
    pub addr_npi: u8,
    pub address_range: String,
}

/// submit_sm / deliver_sm mandatory parameters (both share one layout)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortMessage {
    pub service_type: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub destination_addr: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: Bytes,
}

impl ShortMessage {
    /// Text message to an international number, requesting no receipt
    pub fn text(
        source_addr: impl Into<String>,
        source_addr_ton: u8,
        source_addr_npi: u8,
        destination_addr: impl Into<String>,
        data_coding: u8,
        payload: Bytes,
    ) -> Self {
        Self {
            service_type: String::new(),
            source_addr_ton,
            source_addr_npi,
            source_addr: source_addr.into(),
            dest_addr_ton: 1,
            dest_addr_npi: 1,
            destination_addr: destination_addr.into(),
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: String::new(),
            validity_period: String::new(),
            registered_delivery: 0,
            replace_if_present_flag: 0,
            data_coding,
            sm_default_msg_id: 0,
            short_message: payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduBody {
    BindTransceiver(BindTransceiver),
    BindTransceiverResp { system_id: String },
    SubmitSm(ShortMessage),
    SubmitSmResp { message_id: String },
    DeliverSm(ShortMessage),
    DeliverSmResp,
    Unbind,
    UnbindResp,
    EnquireLink,
    EnquireLinkResp,
    GenericNack,
    Unknown { command_id: u32, body: Bytes },
}

/// One PDU; `command_length` is computed on encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub command_status: u32,
    pub sequence_number: u32,
    pub body: PduBody,
}

impl Pdu {
    pub fn request(sequence_number: u32, body: PduBody) -> Self {
        Self {
            command_status: status::ESME_ROK,
            sequence_number,
            body,
        }
    }

    pub fn response(sequence_number: u32, command_status: u32, body: PduBody) -> Self {
        Self {
            command_status,
            sequence_number,
            body,
        }
    }

    pub fn command_id(&self) -> u32 {
        match &self.body {
            PduBody::BindTransceiver(_) => command::BIND_TRANSCEIVER,
            PduBody::BindTransceiverResp { .. } => command::BIND_TRANSCEIVER_RESP,
            PduBody::SubmitSm(_) => command::SUBMIT_SM,
            PduBody::SubmitSmResp { .. } => command::SUBMIT_SM_RESP,
            PduBody::DeliverSm(_) => command::DELIVER_SM,
            PduBody::DeliverSmResp => command::DELIVER_SM_RESP,
            PduBody::Unbind => command::UNBIND,
            PduBody::UnbindResp => command::UNBIND_RESP,
            PduBody::EnquireLink => command::ENQUIRE_LINK,
            PduBody::EnquireLinkResp => command::ENQUIRE_LINK_RESP,
            PduBody::GenericNack => command::GENERIC_NACK,
            PduBody::Unknown { command_id, .. } => *command_id,
        }
    }

    pub fn is_response(&self) -> bool {
        self.command_id() & command::RESPONSE_MASK != 0
    }

    /// Append the encoded PDU to `dst`
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), SmppError> {
        let start = dst.len();
        dst.put_u32(0);
        dst.put_u32(self.command_id());
        dst.put_u32(self.command_status);
        dst.put_u32(self.sequence_number);

        match &self.body {
            PduBody::BindTransceiver(bind) => {
                put_cstring(dst, "system_id", &bind.system_id, SYSTEM_ID_MAX)?;
                put_cstring(dst, "password", &bind.password, PASSWORD_MAX)?;
                put_cstring(dst, "system_type", &bind.system_type, SYSTEM_TYPE_MAX)?;
                dst.put_u8(bind.interface_version);
                dst.put_u8(bind.addr_ton);
                dst.put_u8(bind.addr_npi);
                put_cstring(dst, "address_range", &bind.address_range, ADDRESS_RANGE_MAX)?;
            }
            PduBody::BindTransceiverResp { system_id } => {
                put_cstring(dst, "system_id", system_id, SYSTEM_ID_MAX)?;
            }
            PduBody::SubmitSm(sm) | PduBody::DeliverSm(sm) => put_short_message(dst, sm)?,
            PduBody::SubmitSmResp { message_id } => {
                put_cstring(dst, "message_id", message_id, MESSAGE_ID_MAX)?;
            }
            // deliver_sm_resp carries an unused, empty message_id
            PduBody::DeliverSmResp => dst.put_u8(0),
            PduBody::Unknown { body, .. } => dst.put_slice(body),
            PduBody::Unbind
            | PduBody::UnbindResp
            | PduBody::EnquireLink
            | PduBody::EnquireLinkResp
            | PduBody::GenericNack => {}
        }

        let length = dst.len() - start;
        if length > MAX_PDU_LEN {
            return Err(SmppError::InvalidLength(length));
        }
        dst[start..start + 4].copy_from_slice(&(length as u32).to_be_bytes());
        Ok(())
    }

    /// Decode one complete PDU, header included
    pub fn decode(mut frame: Bytes) -> Result<Self, SmppError> {
        if frame.len() < HEADER_LEN {
            return Err(SmppError::InvalidLength(frame.len()));
        }
        let length = frame.get_u32() as usize;
        if length != frame.len() + 4 {
            return Err(SmppError::InvalidLength(length));
        }
        let command_id = frame.get_u32();
        let command_status = frame.get_u32();
        let sequence_number = frame.get_u32();
        let mut body = frame;

        let body = match command_id {
            command::BIND_TRANSCEIVER => PduBody::BindTransceiver(BindTransceiver {
                system_id: get_cstring(&mut body, "system_id", SYSTEM_ID_MAX)?,
                password: get_cstring(&mut body, "password", PASSWORD_MAX)?,
                system_type: get_cstring(&mut body, "system_type", SYSTEM_TYPE_MAX)?,
                interface_version: get_u8(&mut body, "interface_version")?,
                addr_ton: get_u8(&mut body, "addr_ton")?,
                addr_npi: get_u8(&mut body, "addr_npi")?,
                address_range: get_cstring(&mut body, "address_range", ADDRESS_RANGE_MAX)?,
            }),
            // Error responses may omit the body entirely
            command::BIND_TRANSCEIVER_RESP => PduBody::BindTransceiverResp {
                system_id: get_optional_cstring(&mut body, "system_id", SYSTEM_ID_MAX)?,
            },
            command::SUBMIT_SM => PduBody::SubmitSm(get_short_message(&mut body)?),
            command::SUBMIT_SM_RESP => PduBody::SubmitSmResp {
                message_id: get_optional_cstring(&mut body, "message_id", MESSAGE_ID_MAX)?,
            },
            command::DELIVER_SM => PduBody::DeliverSm(get_short_message(&mut body)?),
            command::DELIVER_SM_RESP => PduBody::DeliverSmResp,
            command::UNBIND => PduBody::Unbind,
            command::UNBIND_RESP => PduBody::UnbindResp,
            command::ENQUIRE_LINK => PduBody::EnquireLink,
            command::ENQUIRE_LINK_RESP => PduBody::EnquireLinkResp,
            command::GENERIC_NACK => PduBody::GenericNack,
            other => PduBody::Unknown {
                command_id: other,
                body,
            },
        };

        Ok(Self {
            command_status,
            sequence_number,
            body,
        })
    }
}

/// Pick a data coding for `text` and encode it as a short message payload
pub fn encode_text(text: &str) -> Result<(u8, Bytes), SmppError> {
    let (data_coding, payload): (u8, Vec<u8>) = if text.is_ascii() {
        (DATA_CODING_IA5, text.as_bytes().to_vec())
    } else {
        (
            DATA_CODING_UCS2,
            text.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect(),
        )
    };

    if payload.len() > MAX_SHORT_MESSAGE_LEN {
        return Err(SmppError::MessageTooLong(payload.len()));
    }
    Ok((data_coding, Bytes::from(payload)))
}

fn put_cstring(dst: &mut BytesMut, field: &'static str, value: &str, max: usize) -> Result<(), SmppError> {
    if value.len() + 1 > max || value.as_bytes().contains(&0) {
        return Err(SmppError::FieldTooLong { field, max: max - 1 });
    }
    dst.put_slice(value.as_bytes());
    dst.put_u8(0);
    Ok(())
}

fn put_short_message(dst: &mut BytesMut, sm: &ShortMessage) -> Result<(), SmppError> {
    put_cstring(dst, "service_type", &sm.service_type, SERVICE_TYPE_MAX)?;
    dst.put_u8(sm.source_addr_ton);
    dst.put_u8(sm.source_addr_npi);
    put_cstring(dst, "source_addr", &sm.source_addr, ADDR_MAX)?;
    dst.put_u8(sm.dest_addr_ton);
    dst.put_u8(sm.dest_addr_npi);
    put_cstring(dst, "destination_addr", &sm.destination_addr, ADDR_MAX)?;
    dst.put_u8(sm.esm_class);
    dst.put_u8(sm.protocol_id);
    dst.put_u8(sm.priority_flag);
    put_cstring(dst, "schedule_delivery_time", &sm.schedule_delivery_time, TIME_MAX)?;
    put_cstring(dst, "validity_period", &sm.validity_period, TIME_MAX)?;
    dst.put_u8(sm.registered_delivery);
    dst.put_u8(sm.replace_if_present_flag);
    dst.put_u8(sm.data_coding);
    dst.put_u8(sm.sm_default_msg_id);
    if sm.short_message.len() > MAX_SHORT_MESSAGE_LEN {
        return Err(SmppError::MessageTooLong(sm.short_message.len()));
    }
    dst.put_u8(sm.short_message.len() as u8);
    dst.put_slice(&sm.short_message);
    Ok(())
}

fn get_u8(src: &mut Bytes, field: &'static str) -> Result<u8, SmppError> {
    if !src.has_remaining() {
        return Err(SmppError::Malformed(format!("missing {}", field)));
    }
    Ok(src.get_u8())
}

fn get_cstring(src: &mut Bytes, field: &'static str, max: usize) -> Result<String, SmppError> {
    let end = src
        .iter()
        .take(max)
        .position(|&b| b == 0)
        .ok_or_else(|| SmppError::Malformed(format!("{} is not NUL terminated", field)))?;
    let value = src.split_to(end);
    src.advance(1);
    String::from_utf8(value.to_vec())
        .map_err(|_| SmppError::Malformed(format!("{} is not valid text", field)))
}

fn get_optional_cstring(src: &mut Bytes, field: &'static str, max: usize) -> Result<String, SmppError> {
    if src.has_remaining() {
        get_cstring(src, field, max)
    } else {
        Ok(String::new())
    }
}

fn get_short_message(src: &mut Bytes) -> Result<ShortMessage, SmppError> {
    let service_type = get_cstring(src, "service_type", SERVICE_TYPE_MAX)?;
    let source_addr_ton = get_u8(src, "source_addr_ton")?;
    let source_addr_npi = get_u8(src, "source_addr_npi")?;
    let source_addr = get_cstring(src, "source_addr", ADDR_MAX)?;
    let dest_addr_ton = get_u8(src, "dest_addr_ton")?;
    let dest_addr_npi = get_u8(src, "dest_addr_npi")?;
    let destination_addr = get_cstring(src, "destination_addr", ADDR_MAX)?;
    let esm_class = get_u8(src, "esm_class")?;
    let protocol_id = get_u8(src, "protocol_id")?;
    let priority_flag = get_u8(src, "priority_flag")?;
    let schedule_delivery_time = get_cstring(src, "schedule_delivery_time", TIME_MAX)?;
    let validity_period = get_cstring(src, "validity_period", TIME_MAX)?;
    let registered_delivery = get_u8(src, "registered_delivery")?;
    let replace_if_present_flag = get_u8(src, "replace_if_present_flag")?;
    let data_coding = get_u8(src, "data_coding")?;
    let sm_default_msg_id = get_u8(src, "sm_default_msg_id")?;
    let sm_length = get_u8(src, "sm_length")? as usize;
    if src.remaining() < sm_length {
        return Err(SmppError::Malformed("short_message shorter than sm_length".to_string()));
    }
    let short_message = src.split_to(sm_length);
    // Optional TLVs are not used

    Ok(ShortMessage {
        service_type,
        source_addr_ton,
        source_addr_npi,
        source_addr,
        dest_addr_ton,
        dest_addr_npi,
        destination_addr,
        esm_class,
        protocol_id,
        priority_flag,
        schedule_delivery_time,
        validity_period,
        registered_delivery,
        replace_if_present_flag,
        data_coding,
        sm_default_msg_id,
        short_message,
    })
}
