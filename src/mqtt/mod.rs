mod connack;
mod connect;
mod disconnect;
mod pingreq;
mod pingresp;
mod publish;
mod suback;
mod subscribe;
mod unsuback;
mod unsubscribe;

pub use connack::{ConnackPacket, ConnectReturnCode};
pub use connect::ConnectPacket;
pub use disconnect::DisconnectPacket;
pub use pingreq::PingReqPacket;
pub use pingresp::PingRespPacket;
pub use publish::PublishPacket;
pub use suback::{SubackPacket, SUBACK_FAILURE};
pub use subscribe::{SubscribePacket, SubscriptionTopic};
pub use unsuback::UnsubackPacket;
pub use unsubscribe::UnsubscribePacket;

use crate::broker::Broker;
use crate::connection::Connection;
use crate::error::{Error, Result};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Wire-level (de)serialization helpers shared by every packet type:
/// the MQTT variable-length integer and length-prefixed strings/bytes.
pub mod protocol {
    use super::*;

    const MAX_PAYLOAD_SIZE: usize = 268_435_455;

    /// Parses the variable byte integer at the head of `buf`, returning
    /// its value. Used for "remaining length" framing.
    pub fn read_remaining_length(buf: &mut impl Read) -> Result<u32> {
        let mut multiplier: u32 = 1;
        let mut value: u32 = 0;
        for _ in 0..4 {
            let byte = buf
                .read_u8()
                .map_err(|e| Error::MalformedPacket(format!("remaining length: {e}")))?;
            value += u32::from(byte & 0x7F) * multiplier;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            multiplier *= 128;
        }
        Err(Error::MalformedPacket(
            "variable length integer exceeds 4 bytes".into(),
        ))
    }

    /// Writes `len` as a variable byte integer, returning the number of
    /// bytes used (1-4). Fails if `len` exceeds the MQTT-mandated max.
    pub fn write_remaining_length(buf: &mut impl Write, len: usize) -> Result<usize> {
        if len > MAX_PAYLOAD_SIZE {
            return Err(Error::MalformedPacket("remaining length too large".into()));
        }

        let mut x = len;
        let mut count = 0;
        loop {
            let mut byte = (x % 128) as u8;
            x /= 128;
            if x > 0 {
                byte |= 0x80;
            }
            buf.write_u8(byte)
                .map_err(|e| Error::MalformedPacket(format!("remaining length: {e}")))?;
            count += 1;
            if x == 0 {
                break;
            }
        }
        Ok(count)
    }

    /// Reads a `u16`-length-prefixed UTF-8 string.
    pub fn read_string(buf: &mut impl Read) -> Result<String> {
        let length = buf
            .read_u16::<NetworkEndian>()
            .map_err(|e| Error::MalformedPacket(format!("string length: {e}")))?;
        let mut bytes = vec![0u8; length as usize];
        buf.read_exact(&mut bytes)
            .map_err(|e| Error::MalformedPacket(format!("string body: {e}")))?;
        String::from_utf8(bytes).map_err(|e| Error::MalformedPacket(format!("invalid utf8: {e}")))
    }

    /// Serializes raw bytes with no length prefix (used for PUBLISH
    /// payloads, whose length is derived from `remaining`).
    pub fn write_bytes(buf: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
        buf.write_all(bytes)
    }

    /// Serializes a `u16`-length-prefixed UTF-8 string.
    pub fn write_string(buf: &mut impl Write, string: &str) -> io::Result<()> {
        let bytes = string.as_bytes();
        buf.write_u16::<NetworkEndian>(bytes.len() as u16)?;
        buf.write_all(bytes)
    }
}

/// The 4-bit MQTT control packet type, per the OASIS spec.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Reserved1 = 0,
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
    Reserved2 = 15,
}

impl From<u8> for PacketType {
    fn from(nibble: u8) -> Self {
        match nibble {
            1 => PacketType::Connect,
            2 => PacketType::Connack,
            3 => PacketType::Publish,
            4 => PacketType::Puback,
            5 => PacketType::Pubrec,
            6 => PacketType::Pubrel,
            7 => PacketType::Pubcomp,
            8 => PacketType::Subscribe,
            9 => PacketType::Suback,
            10 => PacketType::Unsubscribe,
            11 => PacketType::Unsuback,
            12 => PacketType::Pingreq,
            13 => PacketType::Pingresp,
            14 => PacketType::Disconnect,
            15 => PacketType::Reserved2,
            _ => PacketType::Reserved1,
        }
    }
}

/// Bit-packed flags carried in the low nibble of the fixed header's
/// first byte: `retain` (bit 0), `qos` (bits 1-2), `dup` (bit 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedHeaderFlags {
    pub retain: bool,
    pub qos: u8,
    pub dup: bool,
}

impl FixedHeaderFlags {
    pub fn new(retain: bool, qos: u8, dup: bool) -> Self {
        Self { retain, qos, dup }
    }

    pub fn from_byte(byte: u8) -> Self {
        let retain = byte & 0x01 != 0;
        let qos = (byte >> 1) & 0x03;
        let dup = byte & 0x08 != 0;
        Self::new(retain, qos, dup)
    }

    pub fn to_byte(self) -> u8 {
        (self.retain as u8) | (self.qos << 1) | ((self.dup as u8) << 3)
    }
}

/// The 2+ byte header present on every MQTT packet: opcode nibble, dup/
/// qos/retain flags, and the variable-length "remaining" byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: FixedHeaderFlags,
    pub remaining_length: u32,
}

/// Minimum wire size of a fixed header: one type/flags byte plus the
/// shortest possible remaining-length encoding (1 byte).
pub const FIXED_HEADER_MIN_SIZE: usize = 2;

impl FixedHeader {
    pub fn new(packet_type: PacketType, flags: FixedHeaderFlags, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    pub fn from_bytes(buf: &mut impl Read) -> Result<FixedHeader> {
        let byte = buf
            .read_u8()
            .map_err(|e| Error::MalformedPacket(format!("fixed header: {e}")))?;
        let remaining_length = protocol::read_remaining_length(buf)?;
        Ok(FixedHeader::new(
            PacketType::from(byte >> 4),
            FixedHeaderFlags::from_byte(byte),
            remaining_length,
        ))
    }

    pub fn write(&self, buf: &mut impl Write) -> Result<()> {
        let byte = ((self.packet_type as u8) << 4) | (self.flags.to_byte() & 0x0F);
        buf.write_u8(byte)
            .map_err(|e| Error::MalformedPacket(format!("fixed header: {e}")))?;
        protocol::write_remaining_length(buf, self.remaining_length as usize)?;
        Ok(())
    }
}

/// Polymorphic inbound message, tagged by packet kind (Design Notes:
/// a sum type replaces a heap-allocated trait object per message).
#[derive(Debug)]
pub enum Message {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Publish(PublishPacket),
    Subscribe(SubscribePacket),
    Suback(SubackPacket),
    Unsubscribe(UnsubscribePacket),
    Unsuback(UnsubackPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

impl Message {
    /// Decodes exactly one whole MQTT packet from `bytes` (fixed header
    /// + body). Returns `Ok(None)` for unknown/reserved/unhandled
    /// packet types, which the stream should simply drop.
    pub fn decode(bytes: &[u8]) -> Result<Option<Message>> {
        let mut cursor = bytes;
        let header = FixedHeader::from_bytes(&mut cursor)?;
        let msg = match header.packet_type {
            PacketType::Connect => Message::Connect(ConnectPacket::read_body(&mut cursor)?),
            PacketType::Connack => Message::Connack(ConnackPacket::read_body(&mut cursor)?),
            PacketType::Publish => {
                Message::Publish(PublishPacket::read_body(&mut cursor, &header)?)
            }
            PacketType::Subscribe => {
                Message::Subscribe(SubscribePacket::read_body(&mut cursor, &header)?)
            }
            PacketType::Suback => Message::Suback(SubackPacket::read_body(&mut cursor, &header)?),
            PacketType::Unsubscribe => {
                Message::Unsubscribe(UnsubscribePacket::read_body(&mut cursor, &header)?)
            }
            PacketType::Unsuback => Message::Unsuback(UnsubackPacket::read_body(&mut cursor)?),
            PacketType::Pingreq => Message::PingReq(PingReqPacket),
            PacketType::Pingresp => Message::PingResp(PingRespPacket),
            PacketType::Disconnect => Message::Disconnect(DisconnectPacket),
            other => {
                tracing::debug!(packet_type = ?other, "dropping unhandled packet type");
                return Ok(None);
            }
        };
        Ok(Some(msg))
    }

    /// Single dispatch point: mutates broker state and writes any
    /// response back through `connection`.
    pub fn handle(&self, broker: &mut Broker, connection: &dyn Connection) -> Result<()> {
        match self {
            Message::Connect(p) => broker.on_connect(connection, p),
            Message::Publish(p) => broker.on_publish(connection, p),
            Message::Subscribe(p) => broker.on_subscribe(connection, p),
            Message::Unsubscribe(p) => broker.on_unsubscribe(connection, p),
            Message::PingReq(_) => broker.on_pingreq(connection),
            Message::Disconnect(_) => broker.on_disconnect(connection),
            // Server-bound-only packet types below: a broker never receives
            // these from a well-behaved client; ignore rather than error.
            Message::Connack(_)
            | Message::Suback(_)
            | Message::Unsuback(_)
            | Message::PingResp(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlq_round_trips_boundaries() {
        for &value in &[
            0u32, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455,
        ] {
            let mut buf = Vec::new();
            protocol::write_remaining_length(&mut buf, value as usize).unwrap();
            let decoded = protocol::read_remaining_length(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn vlq_rejects_fifth_continuation_byte() {
        let bytes = [0x80, 0x80, 0x80, 0x80];
        let err = protocol::read_remaining_length(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }

    #[test]
    fn fixed_header_round_trips() {
        let header = FixedHeader::new(
            PacketType::Publish,
            FixedHeaderFlags::new(true, 1, false),
            42,
        );
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let decoded = FixedHeader::from_bytes(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn remaining_length_matches_body_size() {
        let header = FixedHeader::new(PacketType::Pingreq, FixedHeaderFlags::default(), 0);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), FIXED_HEADER_MIN_SIZE);
    }

    #[test]
    fn unknown_packet_type_decodes_to_none() {
        // PUBACK (0x40) with remaining_length=2 and a two byte body: a
        // recognized opcode nibble, but not one the factory constructs.
        let bytes = [0x40, 0x02, 0x00, 0x01];
        let decoded = Message::decode(&bytes).unwrap();
        assert!(decoded.is_none());
    }
}
