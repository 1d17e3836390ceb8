use bytes::{Buf, BufMut, Bytes, BytesMut};
use core::fmt::Display;

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind},
    io::{decode_bytes, decode_packet_length, decode_utf8, encode_bytes, encode_packet_length, encode_utf8},
    qos::{QosLevel, SubAckQoS},
    topic::{TopicFilter, TopicFilterResult, TopicName, TopicSubscription},
    ConnectReturnCode,
};

pub trait Encode {
    fn encode(&self) -> Result<Bytes, EncodeError>;
}

pub trait Decode<T, E> {
    fn decode(fixed_header: FixedHeader, bytes: &mut Bytes) -> Result<T, E>;
}

const PACKET_TYPE_BITS: u8 = 0b1111_0000;
const PACKET_FLAG_BITS: u8 = 0b0000_1111;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum PacketType {
    CONNECT = 0b0001_0000,
    CONNACK = 0b0010_0000,
    PUBLISH = 0b0011_0000,
    SUBSCRIBE = 0b1000_0000,
    SUBACK = 0b1001_0000,
    UNSUBSCRIBE = 0b1010_0000,
    UNSUBACK = 0b1011_0000,
    PINGREQ = 0b1100_0000,
    PINGRESP = 0b1101_0000,
    DISCONNECT = 0b1110_0000,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let out = match value & PACKET_TYPE_BITS {
            0x10 => Self::CONNECT,
            0x20 => Self::CONNACK,
            0x30 => Self::PUBLISH,
            0x80 => Self::SUBSCRIBE,
            0x90 => Self::SUBACK,
            0xA0 => Self::UNSUBSCRIBE,
            0xB0 => Self::UNSUBACK,
            0xC0 => Self::PINGREQ,
            0xD0 => Self::PINGRESP,
            0xE0 => Self::DISCONNECT,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::PacketType,
                    format!("Packet type {value} is not a valid or supported packet."),
                ))
            }
        };
        return Ok(out);
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CONNECT => write!(f, "PacketType::CONNECT"),
            Self::CONNACK => write!(f, "PacketType::CONNACK"),
            Self::PUBLISH => write!(f, "PacketType::PUBLISH"),
            Self::SUBSCRIBE => write!(f, "PacketType::SUBSCRIBE"),
            Self::SUBACK => write!(f, "PacketType::SUBACK"),
            Self::UNSUBSCRIBE => write!(f, "PacketType::UNSUBSCRIBE"),
            Self::UNSUBACK => write!(f, "PacketType::UNSUBACK"),
            Self::PINGREQ => write!(f, "PacketType::PINGREQ"),
            Self::PINGRESP => write!(f, "PacketType::PINGRESP"),
            Self::DISCONNECT => write!(f, "PacketType::DISCONNECT"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct HeaderFlags {
    byte: u8,
}

impl HeaderFlags {
    pub fn as_byte(&self) -> u8 {
        return self.byte;
    }
}

// https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718022
impl TryFrom<(PacketType, u8)> for HeaderFlags {
    type Error = DecodeError;
    fn try_from((type_, byte): (PacketType, u8)) -> Result<Self, DecodeError> {
        match type_ {
            PacketType::PUBLISH => {}
            PacketType::SUBSCRIBE | PacketType::UNSUBSCRIBE => {
                if byte & PACKET_FLAG_BITS != 2 {
                    return Err(DecodeError::new(
                        DecodeErrorKind::FlagBits,
                        format!(
                            "Invalid flag bits: {} for packet type: {}, byte must be == 2 for packet type {type_}.",
                            byte, type_
                        ),
                    ));
                }
            }
            _ => {
                if byte & PACKET_FLAG_BITS != 0 {
                    return Err(DecodeError::new(
                        DecodeErrorKind::FlagBits,
                        format!(
                            "Invalid flag bits: {} for packet type: {}, bits must be == 0 for packet type {type_}.",
                            byte, type_
                        ),
                    ));
                }
            }
        }
        return Ok(Self { byte });
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FixedHeader {
    pub type_: PacketType,
    pub flags: HeaderFlags,
    rest_len: usize,
    header_len: usize,
}

impl FixedHeader {
    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.len() == 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::ImproperDisconnect,
                String::from("Received packet of length zero."),
            ));
        }

        let type_byte = bytes.get_u8();
        let type_ = PacketType::try_from(type_byte)?;
        let flags = HeaderFlags::try_from((type_, type_byte))?;
        let (len_len, rest_len) = decode_packet_length(bytes)?;

        return Ok(Self {
            type_,
            flags,
            // encoded length + 1 to account for the packet type byte.
            header_len: len_len + 1,
            rest_len,
        });
    }

    pub fn header_len(&self) -> usize {
        return self.header_len;
    }

    pub fn rest_len(&self) -> usize {
        return self.rest_len;
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum MqttPacket {
    ConnAck(ConnAckPacket),
    Connect(ConnectPacket),
    Disconnect(DisconnectPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Publish(PublishPacket),
    SubAck(SubAckPacket),
    Subscribe(SubscribePacket),
    UnsubAck(UnsubAckPacket),
    Unsubscribe(UnsubscribePacket),
}

impl MqttPacket {
    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        return match f_header.type_ {
            PacketType::CONNACK => Ok(Self::ConnAck(ConnAckPacket::decode(bytes)?)),
            PacketType::CONNECT => Ok(Self::Connect(ConnectPacket::decode(bytes)?)),
            PacketType::DISCONNECT => Ok(Self::Disconnect(DisconnectPacket::decode(f_header)?)),
            PacketType::PINGREQ => Ok(Self::PingReq(PingReqPacket::decode(f_header)?)),
            PacketType::PINGRESP => Ok(Self::PingResp(PingRespPacket::decode(f_header)?)),
            PacketType::PUBLISH => Ok(Self::Publish(PublishPacket::decode(f_header, bytes)?)),
            PacketType::SUBACK => Ok(Self::SubAck(SubAckPacket::decode(bytes)?)),
            PacketType::SUBSCRIBE => Ok(Self::Subscribe(SubscribePacket::decode(bytes)?)),
            PacketType::UNSUBACK => Ok(Self::UnsubAck(UnsubAckPacket::decode(f_header, bytes)?)),
            PacketType::UNSUBSCRIBE => Ok(Self::Unsubscribe(UnsubscribePacket::decode(bytes)?)),
        };
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        return match self {
            Self::ConnAck(packet) => Ok(packet.encode()),
            Self::Connect(packet) => packet.encode(),
            Self::Disconnect(packet) => Ok(packet.encode()),
            Self::PingReq(packet) => Ok(packet.encode()),
            Self::PingResp(packet) => Ok(packet.encode()),
            Self::Publish(packet) => packet.encode(),
            Self::SubAck(packet) => packet.encode(),
            Self::Subscribe(packet) => packet.encode(),
            Self::UnsubAck(packet) => Ok(packet.encode()),
            Self::Unsubscribe(packet) => packet.encode(),
        };
    }
}

/*
 * After a Network Connection is established by a Client to a Server, the first
 * Packet sent from the Client to the Server MUST be a CONNECT Packet [MQTT-3.1.0-1].
 */
#[derive(Clone, PartialEq, Debug)]
pub struct ConnectPacket {
    level: u8,
    conn_flags: ConnectFlags,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    username: Option<String>,
    password: Option<Bytes>,
}

impl ConnectPacket {
    pub fn new(
        is_clean_session: bool,
        keep_alive: u16,
        client_id: String,
        will: Option<Will>,
        username: Option<String>,
        password: Option<Bytes>,
    ) -> Self {
        let mut conn_flags = ConnectFlags::default();

        if username.is_some() {
            conn_flags.set_user_name(true);
        }

        if password.is_some() {
            conn_flags.set_password(true);
        }

        if let Some(will) = &will {
            conn_flags.set_will_retain(will.will_retain);
            conn_flags.set_will_qos(will.will_qos);
            conn_flags.set_will(true);
        }

        if is_clean_session {
            conn_flags.set_clean_session(true);
        }

        return Self {
            level: 4,
            conn_flags,
            keep_alive,
            client_id,
            will,
            username,
            password,
        };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let protocol_name = decode_utf8(bytes)?;
        if protocol_name != "MQTT" {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidProtocol,
                format!("Only MQTT packet types are allowed, instead received type: {protocol_name}"),
            ));
        }

        let level = bytes.get_u8();

        if level != 4 {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidProtocol,
                format!("Mqtt V3.1.1 Requires Protocol level to be 4, instead received: {level}"),
            ));
        }

        let conn_flags = ConnectFlags::from_byte(bytes.get_u8())?;

        let keep_alive = bytes.get_u16();

        let client_id = decode_utf8(bytes)?;

        let mut will = None;

        if conn_flags.will() {
            let topic = decode_utf8(bytes)?;
            let message = decode_utf8(bytes)?;
            let qos = conn_flags.will_qos();
            let retain = conn_flags.will_retain();

            will = Some(Will::new(TopicName::from_str(topic.as_str())?, message, qos, retain));
        }

        let username = if conn_flags.user_name() {
            Some(decode_utf8(bytes)?)
        } else {
            None
        };

        let password = if conn_flags.password() {
            Some(decode_bytes(bytes)?)
        } else {
            None
        };

        return Ok(Self {
            level,
            conn_flags,
            keep_alive,
            client_id,
            will,
            username,
            password,
        });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        // protocol level byte + connect flags byte + keep alive (2 bytes)
        let mut len = 1 + 1 + 2;
        // utf-8 fields are prefixed by a two byte length field.
        len += 2 + 4; // "MQTT"
        len += 2 + self.client_id.len();

        if let Some(will) = &self.will {
            len += will.will_topic.len() + 2;
            len += will.will_message.len() + 2;
        }

        if let Some(username) = &self.username {
            len += username.len() + 2;
        }

        if let Some(password) = &self.password {
            len += password.len() + 2;
        }

        let mut bytes = BytesMut::with_capacity(len);

        bytes.put_u8(PacketType::CONNECT as u8);

        encode_packet_length(&mut bytes, len)?;

        encode_utf8(&mut bytes, "MQTT")?;

        bytes.put_u8(self.level);
        bytes.put_u8(self.conn_flags.as_byte());
        bytes.put_u16(self.keep_alive);

        encode_utf8(&mut bytes, &self.client_id)?;

        if let Some(will) = &self.will {
            encode_utf8(&mut bytes, &will.will_topic.clone().to_string())?;
            encode_utf8(&mut bytes, &will.will_message)?;
        }

        if let Some(username) = &self.username {
            encode_utf8(&mut bytes, username)?;
        }

        if let Some(password) = &self.password {
            encode_bytes(&mut bytes, password)?;
        }

        return Ok(bytes.into());
    }

    pub fn client_id(&self) -> &str {
        return &self.client_id;
    }

    pub fn clean_session(&self) -> bool {
        return self.conn_flags.clean_session();
    }

    pub fn username(&self) -> &Option<String> {
        return &self.username;
    }

    pub fn password(&self) -> &Option<Bytes> {
        return &self.password;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    will_topic: TopicName,
    will_message: String,
    will_qos: QosLevel,
    will_retain: bool,
}

impl Will {
    pub fn new(will_topic: TopicName, will_message: String, will_qos: QosLevel, will_retain: bool) -> Self {
        return Self {
            will_topic,
            will_message,
            will_qos,
            will_retain,
        };
    }

    pub fn will_topic(&self) -> &TopicName {
        return &self.will_topic;
    }

    pub fn will_message(&self) -> &str {
        return &self.will_message;
    }

    pub fn will_qos(&self) -> QosLevel {
        return self.will_qos;
    }

    pub fn will_retain(&self) -> bool {
        return self.will_retain;
    }
}

const USERNAME: u8 = 0b1000_0000;
const PASSWORD: u8 = 0b0100_0000;
const WILL_RETAIN: u8 = 0b0010_0000;
const WILL_QOS_2: u8 = 0b0001_0000;
const WILL_QOS_1: u8 = 0b0000_1000;
const WILL_QOS_BITS: u8 = 0b0001_1000;
const WILL: u8 = 0b0000_0100;
const CLEAN_SESSION: u8 = 0b0000_0010;
const RESERVED_BIT: u8 = 0b0000_0001;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct ConnectFlags {
    byte: u8,
}

impl ConnectFlags {
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        if byte & RESERVED_BIT == RESERVED_BIT {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                format!("Connect packet cannot have reserved bit (index 0) set, received: {byte}"),
            ));
        }
        if byte & WILL == 0 && byte & 0b0011_1000 != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::Will,
                format!(
                    "Optional connection Will bits were set, but the Will bit itself was unset, received: {byte}"
                ),
            ));
        }
        if byte & PASSWORD == PASSWORD && byte & USERNAME != USERNAME {
            return Err(DecodeError::new(
                DecodeErrorKind::UsernamePassword,
                format!("Password bit is set and Username bit is unset, received: {byte}"),
            ));
        }

        return Ok(Self { byte });
    }

    pub fn as_byte(&self) -> u8 {
        return self.byte;
    }

    pub fn will_qos(&self) -> QosLevel {
        match self.byte & WILL_QOS_BITS {
            WILL_QOS_1 => QosLevel::AtLeastOnce,
            WILL_QOS_2 => QosLevel::ExactlyOnce,
            _ => QosLevel::AtMostOnce,
        }
    }

    pub fn set_will_qos(&mut self, value: QosLevel) {
        self.byte &= !WILL_QOS_BITS;
        self.byte |= (value as u8) << 3;
    }

    pub fn user_name(&self) -> bool {
        return self.byte & USERNAME == USERNAME;
    }

    pub fn set_user_name(&mut self, val: bool) {
        if val {
            self.byte |= USERNAME;
        } else {
            self.byte &= !USERNAME;
        }
    }

    pub fn password(&self) -> bool {
        return self.byte & PASSWORD == PASSWORD;
    }

    pub fn set_password(&mut self, val: bool) {
        if val {
            self.byte |= PASSWORD;
        } else {
            self.byte &= !PASSWORD;
        }
    }

    pub fn will_retain(&self) -> bool {
        return self.byte & WILL_RETAIN == WILL_RETAIN;
    }

    pub fn set_will_retain(&mut self, val: bool) {
        if val {
            self.byte |= WILL_RETAIN;
        } else {
            self.byte &= !WILL_RETAIN;
        }
    }

    pub fn will(&self) -> bool {
        return self.byte & WILL == WILL;
    }

    pub fn set_will(&mut self, val: bool) {
        if val {
            self.byte |= WILL;
        } else {
            self.byte &= !WILL;
        }
    }

    pub fn clean_session(&self) -> bool {
        return self.byte & CLEAN_SESSION == CLEAN_SESSION;
    }

    pub fn set_clean_session(&mut self, val: bool) {
        if val {
            self.byte |= CLEAN_SESSION;
        } else {
            self.byte &= !CLEAN_SESSION;
        }
    }
}

impl Default for ConnectFlags {
    fn default() -> Self {
        return Self { byte: 0 };
    }
}

/*
 * The CONNACK Packet is the packet sent by the Server in response to a CONNECT Packet.
 * The first packet sent from the Server to the Client MUST be a CONNACK Packet [MQTT-3.2.0-1].
 */
#[derive(PartialEq, Debug, Clone)]
pub struct ConnAckPacket {
    session_present: bool,
    return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        return Self {
            session_present,
            return_code,
        };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let session_present_byte = bytes.get_u8();

        if (session_present_byte & 0b1111_1110) != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                format!("One of the reserved bits inside the fixed header were set: {bytes:?}"),
            ));
        }

        let return_code = bytes.get_u8().try_into()?;

        return Ok(Self {
            session_present: session_present_byte != 0,
            return_code,
        });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(4);

        bytes.put_u8(PacketType::CONNACK as u8);
        bytes.put_u8(2);
        bytes.put_u8(self.session_present as u8);
        bytes.put_u8(self.return_code as u8);

        return bytes.into();
    }

    pub fn return_code(&self) -> ConnectReturnCode {
        return self.return_code;
    }

    pub fn session_present(&self) -> bool {
        return self.session_present;
    }
}

/*
 * A PUBLISH Control Packet is sent from a Client to a Server or from Server to
 * a Client to transport an Application Message.
 */
#[derive(PartialEq, Clone, Debug)]
pub struct PublishPacket {
    flags: PublishFixedHeaderFlags,
    topic_name: TopicName,
    packet_id: Option<u16>,
    payload: Bytes,
}

impl PublishPacket {
    pub fn new(topic_name: &TopicName, payload: Bytes) -> Self {
        return Self {
            packet_id: None,
            topic_name: topic_name.clone(),
            flags: PublishFixedHeaderFlags::zero(),
            payload,
        };
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let topic_name_in = decode_utf8(bytes)?;
        let topic_name = TopicName::from_str(topic_name_in.as_str())?;

        let flags = PublishFixedHeaderFlags::from_byte(f_header.flags.as_byte());

        let packet_id = if flags.qos() != QosLevel::AtMostOnce {
            Some(bytes.get_u16())
        } else {
            None
        };

        return Ok(Self {
            packet_id,
            flags,
            topic_name,
            payload: bytes.clone(),
        });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut len = 2 + self.topic_name.len();

        if self.packet_id.is_some() {
            len += 2;
        }

        len += self.payload.len();

        let mut bytes = BytesMut::with_capacity(len);

        bytes.put_u8(PacketType::PUBLISH as u8 | self.flags.byte);

        encode_packet_length(&mut bytes, len)?;

        encode_utf8(&mut bytes, &self.topic_name.clone().to_string())?;

        if let Some(packet_id) = self.packet_id {
            bytes.put_u16(packet_id);
        }

        bytes.put_slice(&self.payload);

        return Ok(bytes.into());
    }

    pub fn topic(&self) -> &TopicName {
        return &self.topic_name;
    }

    pub fn qos(&self) -> QosLevel {
        return self.flags.qos();
    }

    pub fn retain(&self) -> bool {
        return self.flags.retain();
    }

    pub fn set_retain(&mut self, val: bool) {
        self.flags.set_retain(val);
    }

    pub fn dup(&self) -> bool {
        return self.flags.dup();
    }

    pub fn id(&self) -> Option<u16> {
        return self.packet_id;
    }

    pub fn payload(&self) -> &Bytes {
        return &self.payload;
    }
}

const RETAIN: u8 = 0b0000_0001;
const QOS_1: u8 = 0b0000_0010;
const QOS_2: u8 = 0b0000_0100;
const QOS_BITS: u8 = 0b0000_0110;
const DUP: u8 = 0b0000_1000;

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PublishFixedHeaderFlags {
    byte: u8,
}

impl PublishFixedHeaderFlags {
    fn from_byte(byte: u8) -> Self {
        return Self { byte: byte & 0b0000_1111 };
    }

    fn zero() -> Self {
        return Self { byte: 0 };
    }

    fn qos(&self) -> QosLevel {
        match self.byte & QOS_BITS {
            QOS_1 => QosLevel::AtLeastOnce,
            QOS_2 => QosLevel::ExactlyOnce,
            _ => QosLevel::AtMostOnce,
        }
    }

    fn retain(&self) -> bool {
        return self.byte & RETAIN == RETAIN;
    }

    fn set_retain(&mut self, val: bool) {
        if val {
            self.byte |= RETAIN;
        } else {
            self.byte &= !RETAIN;
        }
    }

    fn dup(&self) -> bool {
        return self.byte & DUP == DUP;
    }
}

/*
 * The SUBSCRIBE Packet is sent from the Client to the Server to create one or
 * more Subscriptions.
 */
#[derive(PartialEq, Clone, Debug)]
pub struct SubscribePacket {
    packet_id: u16,
    payload: Vec<TopicFilterResult>,
}

impl SubscribePacket {
    pub fn new(packet_id: u16, payload: Vec<TopicSubscription>) -> Self {
        return Self {
            packet_id,
            payload: payload.into_iter().map(TopicFilterResult::Ok).collect(),
        };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let packet_id = bytes.get_u16();

        let mut payload: Vec<TopicFilterResult> = Vec::new();

        loop {
            match TopicFilter::decode(bytes) {
                Ok(filter) => {
                    let qos: QosLevel = bytes.get_u8().try_into()?;
                    payload.push(TopicFilterResult::Ok(TopicSubscription::new(filter, qos)));
                    if bytes.remaining() == 0 {
                        break;
                    }
                }
                Err(_) => payload.push(TopicFilterResult::Err),
            }
        }

        return Ok(Self { packet_id, payload });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut len = 2;

        for topic in &self.payload {
            match topic {
                TopicFilterResult::Ok(sub) => len += 2 + 1 + sub.filter().len(),
                TopicFilterResult::Err => {
                    return Err(EncodeError::new(
                        EncodeErrorKind::OversizedPayload,
                        String::from("Cannot encode a SUBSCRIBE payload entry that failed to parse."),
                    ))
                }
            }
        }

        let mut bytes = BytesMut::with_capacity(len);

        bytes.put_u8(PacketType::SUBSCRIBE as u8 | 0x02);

        encode_packet_length(&mut bytes, len)?;

        bytes.put_u16(self.packet_id);

        for topic in &self.payload {
            if let TopicFilterResult::Ok(sub) = topic {
                encode_utf8(&mut bytes, &sub.filter().clone().to_string())?;
                bytes.put_u8(sub.qos() as u8);
            }
        }

        return Ok(bytes.into());
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }

    pub fn topic_filters(&self) -> &Vec<TopicFilterResult> {
        return &self.payload;
    }
}

/*
 * A SUBACK Packet is sent by the Server to the Client to confirm receipt and
 * processing of a SUBSCRIBE Packet.
 */
#[derive(PartialEq, Clone, Debug)]
pub struct SubAckPacket {
    packet_id: u16,
    payload: Vec<SubAckQoS>,
}

impl SubAckPacket {
    pub fn new(packet_id: u16, payload: Vec<SubAckQoS>) -> Self {
        return Self { packet_id, payload };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let packet_id = bytes.get_u16();

        let mut payload: Vec<SubAckQoS> = Vec::new();

        while bytes.remaining() > 0 {
            payload.push(bytes.get_u8().try_into()?);
        }

        return Ok(Self { packet_id, payload });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let len = 2 + self.payload.len();

        let mut bytes = BytesMut::with_capacity(len);

        bytes.put_u8(PacketType::SUBACK as u8);
        encode_packet_length(&mut bytes, len)?;

        bytes.put_u16(self.packet_id);

        for qos in &self.payload {
            bytes.put_u8((*qos).into());
        }

        return Ok(bytes.into());
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }

    pub fn filters(&self) -> &Vec<SubAckQoS> {
        return &self.payload;
    }
}

/*
 * An UNSUBSCRIBE Packet is sent by the Client to the Server, to unsubscribe from topics.
 */
#[derive(PartialEq, Clone, Debug)]
pub struct UnsubscribePacket {
    packet_id: u16,
    filters: Vec<TopicFilter>,
}

impl UnsubscribePacket {
    pub fn new(packet_id: u16, filters: Vec<TopicFilter>) -> Self {
        return Self { packet_id, filters };
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let packet_id = bytes.get_u16();

        let mut filters = Vec::new();

        loop {
            filters.push(TopicFilter::decode(bytes)?);

            if bytes.remaining() == 0 {
                break;
            }
        }

        return Ok(Self { packet_id, filters });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut len = 2;

        for filter in &self.filters {
            len += 2 + filter.len()
        }

        let mut bytes = BytesMut::with_capacity(len);

        bytes.put_u8(PacketType::UNSUBSCRIBE as u8 | 0x02);

        encode_packet_length(&mut bytes, len)?;

        bytes.put_u16(self.packet_id);

        for filter in &self.filters {
            encode_utf8(&mut bytes, &filter.clone().to_string())?;
        }

        return Ok(bytes.into());
    }

    pub fn filters(&self) -> &Vec<TopicFilter> {
        return &self.filters;
    }
}

/*
 * The UNSUBACK Packet is sent by the Server to the Client to confirm receipt of
 * an UNSUBSCRIBE Packet.
 */
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct UnsubAckPacket {
    packet_id: u16,
}

impl UnsubAckPacket {
    pub fn new(packet_id: u16) -> Self {
        return Self { packet_id };
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("UNSUBACK packets can only contain a packet id."),
            ));
        }
        return Ok(Self { packet_id: bytes.get_u16() });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::new();

        bytes.put_u8(PacketType::UNSUBACK as u8);
        bytes.put_u8(2);
        bytes.put_u16(self.packet_id);

        return bytes.into();
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }
}

/*
 * The PINGREQ Packet is sent from a Client to the Server to indicate the Client
 * is alive and to request a PINGRESP in return.
 */
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PingReqPacket;

impl PingReqPacket {
    pub fn new() -> Self {
        return Self;
    }

    pub fn decode(f_header: FixedHeader) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PINGREQ packets can only contain a fixed header."),
            ));
        }
        return Ok(Self);
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_u8(PacketType::PINGREQ as u8);
        bytes.put_u8(0);
        return bytes.into();
    }
}

/*
 * A PINGRESP Packet is sent by the Server to the Client in response to a PINGREQ.
 */
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PingRespPacket;

impl PingRespPacket {
    pub fn new() -> Self {
        return Self;
    }

    pub fn decode(f_header: FixedHeader) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PINGRESP packets can only contain a fixed header."),
            ));
        }
        return Ok(Self);
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_u8(PacketType::PINGRESP as u8);
        bytes.put_u8(0);
        return bytes.into();
    }
}

/*
 * The DISCONNECT Packet is the final Control Packet sent from the Client to the
 * Server. It indicates that the Client is disconnecting cleanly.
 */
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct DisconnectPacket;

impl DisconnectPacket {
    pub fn new() -> Self {
        return Self;
    }

    pub fn decode(f_header: FixedHeader) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("DISCONNECT packets can only contain a fixed header."),
            ));
        }
        return Ok(Self);
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_u8(PacketType::DISCONNECT as u8);
        bytes.put_u8(0);
        return bytes.into();
    }
}

#[cfg(test)]
mod packet {
    use super::*;
    use crate::qos::{QosLevel, SubAckQoS};

    #[test]
    fn connect_roundtrip() {
        let packet = ConnectPacket::new(true, 100, "id_1".to_string(), None, None, None);
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::Connect(packet));
    }

    #[test]
    fn connack_roundtrip() {
        let packet = ConnAckPacket::new(true, ConnectReturnCode::Accept);
        let mut buf = packet.encode();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::ConnAck(packet));
    }

    #[test]
    fn publish_roundtrip() {
        let packet = PublishPacket::new(
            &TopicName::from_str("this/is/a/test").expect("Could not create topic name"),
            Bytes::from_iter([117]),
        );
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::Publish(packet));
    }

    #[test]
    fn subscribe_roundtrip() {
        let packet = SubscribePacket::new(
            1234,
            vec![TopicSubscription::new(
                TopicFilter::from_str("test").unwrap(),
                QosLevel::AtLeastOnce,
            )],
        );
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::Subscribe(packet));
    }

    #[test]
    fn suback_roundtrip() {
        let packet = SubAckPacket::new(1234, vec![SubAckQoS::QOS(QosLevel::AtLeastOnce)]);
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::SubAck(packet));
    }

    #[test]
    fn unsubscribe_roundtrip() {
        let packet = UnsubscribePacket::new(1234, vec![TopicFilter::from_str("test").unwrap()]);
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::Unsubscribe(packet));
    }

    #[test]
    fn unsuback_roundtrip() {
        let packet = UnsubAckPacket::new(1234);
        let mut buf = packet.encode();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::UnsubAck(packet));
    }

    #[test]
    fn pingreq_pingresp_roundtrip() {
        let mut buf = PingReqPacket::new().encode();
        let f_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(
            MqttPacket::decode(f_header, &mut buf).unwrap(),
            MqttPacket::PingReq(PingReqPacket::new())
        );

        let mut buf = PingRespPacket::new().encode();
        let f_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(
            MqttPacket::decode(f_header, &mut buf).unwrap(),
            MqttPacket::PingResp(PingRespPacket::new())
        );
    }

    #[test]
    fn disconnect_roundtrip() {
        let mut buf = DisconnectPacket::new().encode();
        let f_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(
            MqttPacket::decode(f_header, &mut buf).unwrap(),
            MqttPacket::Disconnect(DisconnectPacket::new())
        );
    }
}
