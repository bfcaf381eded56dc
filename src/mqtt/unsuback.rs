use crate::error::{Error, Result};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubackPacket {
    pub packet_id: u16,
}

impl UnsubackPacket {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }

    /// Encodes the full packet (fixed header + body), ready to send.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = crate::mqtt::FixedHeader::new(
            crate::mqtt::PacketType::Unsuback,
            crate::mqtt::FixedHeaderFlags::default(),
            2,
        );
        let mut buf = Vec::new();
        header.write(&mut buf)?;
        self.write_body(&mut buf)?;
        Ok(buf)
    }

    pub fn write_body(&self, buf: &mut impl Write) -> std::io::Result<()> {
        buf.write_u16::<NetworkEndian>(self.packet_id)
    }

    pub fn read_body(buf: &mut impl Read) -> Result<Self> {
        let packet_id = buf
            .read_u16::<NetworkEndian>()
            .map_err(|e| Error::MalformedPacket(format!("unsuback packet id: {e}")))?;
        Ok(Self { packet_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let unsuback = UnsubackPacket::new(2);
        let mut buf = vec![];
        unsuback.write_body(&mut buf).unwrap();
        let decoded = UnsubackPacket::read_body(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, unsuback);
    }

    #[test]
    fn from_the_spec_example_bytes() {
        // B0 02 00 02
        let body = [0x00, 0x02];
        let decoded = UnsubackPacket::read_body(&mut &body[..]).unwrap();
        assert_eq!(decoded.packet_id, 2);
    }
}
