use crate::error::{Error, Result};
use crate::mqtt::FixedHeader;
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Granted-qos byte meaning the corresponding SUBSCRIBE entry failed
/// (bad topic filter), per spec.md §4.4.
pub const SUBACK_FAILURE: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubackPacket {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl SubackPacket {
    pub fn new(packet_id: u16, return_codes: Vec<u8>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }

    /// Encodes the full packet (fixed header + body), ready to send.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = crate::mqtt::FixedHeader::new(
            crate::mqtt::PacketType::Suback,
            crate::mqtt::FixedHeaderFlags::default(),
            (2 + self.return_codes.len()) as u32,
        );
        let mut buf = Vec::new();
        header.write(&mut buf)?;
        self.write_body(&mut buf)?;
        Ok(buf)
    }

    pub fn write_body(&self, buf: &mut impl Write) -> std::io::Result<()> {
        buf.write_u16::<NetworkEndian>(self.packet_id)?;
        for code in &self.return_codes {
            buf.write_u8(*code)?;
        }
        Ok(())
    }

    pub fn read_body(buf: &mut impl Read, fixed_header: &FixedHeader) -> Result<Self> {
        let packet_id = buf
            .read_u16::<NetworkEndian>()
            .map_err(|e| Error::MalformedPacket(format!("suback packet id: {e}")))?;
        let remaining = fixed_header.remaining_length as usize;
        if remaining < 2 {
            return Err(Error::MalformedPacket(
                "suback remaining length shorter than packet id".into(),
            ));
        }
        let mut return_codes = vec![0u8; remaining - 2];
        buf.read_exact(&mut return_codes)
            .map_err(|e| Error::MalformedPacket(format!("suback return codes: {e}")))?;
        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::{FixedHeaderFlags, PacketType};

    #[test]
    fn round_trips() {
        let suback = SubackPacket::new(1, vec![0, 1, SUBACK_FAILURE]);
        let mut body = vec![];
        suback.write_body(&mut body).unwrap();
        let header = FixedHeader::new(
            PacketType::Suback,
            FixedHeaderFlags::default(),
            body.len() as u32,
        );
        let decoded = SubackPacket::read_body(&mut body.as_slice(), &header).unwrap();
        assert_eq!(decoded, suback);
    }

    #[test]
    fn from_the_spec_example_bytes() {
        // 90 03 00 01 01
        let body = [0x00, 0x01, 0x01];
        let header = FixedHeader::new(
            PacketType::Suback,
            FixedHeaderFlags::default(),
            body.len() as u32,
        );
        let decoded = SubackPacket::read_body(&mut &body[..], &header).unwrap();
        assert_eq!(decoded.packet_id, 1);
        assert_eq!(decoded.return_codes, vec![1]);
    }

    #[test]
    fn remaining_length_shorter_than_packet_id_is_malformed() {
        // 90 00 — opcode SUBACK, remaining_length 0, no body at all.
        let header = FixedHeader::new(PacketType::Suback, FixedHeaderFlags::default(), 0);
        let err = SubackPacket::read_body(&mut &[][..], &header).unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }

    #[test]
    fn remaining_length_of_one_does_not_underflow_the_return_code_count() {
        // A packet_id is present but the header claims no room for it,
        // which previously underflowed `remaining_length - 2` to a huge
        // usize instead of rejecting the packet.
        let header = FixedHeader::new(PacketType::Suback, FixedHeaderFlags::default(), 1);
        let body = [0x00, 0x01];
        let err = SubackPacket::read_body(&mut &body[..], &header).unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }
}
