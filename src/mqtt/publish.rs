use crate::error::{Error, Result};
use crate::mqtt::{protocol, FixedHeader, FixedHeaderFlags, PacketType};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub packet_id: u16,
    pub qos: u8,
    pub dup: bool,
    pub retain: bool,
    pub topic: String,
    pub payload: Vec<u8>,
}

impl fmt::Display for PublishPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PUBLISH: Packet ID: {} Topic: {}",
            self.packet_id, self.topic
        )
    }
}

impl PublishPacket {
    pub fn new(packet_id: u16, topic: String, payload: Vec<u8>, qos: u8) -> Self {
        Self {
            packet_id,
            qos,
            dup: false,
            retain: false,
            topic,
            payload,
        }
    }

    /// Byte count of the body, used to fill in `FixedHeader.remaining`.
    pub fn remaining_length(&self) -> u32 {
        let topic_len = 2 + self.topic.len();
        let msg_id_len = if self.qos > 0 { 2 } else { 0 };
        (topic_len + msg_id_len + self.payload.len()) as u32
    }

    pub fn fixed_header(&self) -> FixedHeader {
        FixedHeader::new(
            PacketType::Publish,
            FixedHeaderFlags::new(self.retain, self.qos, self.dup),
            self.remaining_length(),
        )
    }

    pub fn write(&self, buf: &mut impl Write) -> Result<()> {
        self.fixed_header().write(buf)?;
        self.write_body(buf)?;
        Ok(())
    }

    /// Encodes the full packet (fixed header + body) into a fresh
    /// buffer, ready to hand to a connection's write path.
    pub fn write_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }

    pub fn write_body(&self, buf: &mut impl Write) -> std::io::Result<()> {
        protocol::write_string(buf, &self.topic)?;
        if self.qos > 0 {
            buf.write_u16::<NetworkEndian>(self.packet_id)?;
        }
        protocol::write_bytes(buf, &self.payload)
    }

    pub fn read_body(buf: &mut impl Read, fixed_header: &FixedHeader) -> Result<Self> {
        let topic = protocol::read_string(buf)?;
        let mut bytes_read = 2 + topic.len();
        let packet_id = if fixed_header.flags.qos > 0 {
            bytes_read += 2;
            buf.read_u16::<NetworkEndian>()
                .map_err(|e| Error::MalformedPacket(format!("publish packet id: {e}")))?
        } else {
            0
        };

        let remaining = fixed_header.remaining_length as usize;
        if remaining < bytes_read {
            return Err(Error::MalformedPacket(
                "publish remaining length shorter than header fields".into(),
            ));
        }
        let mut payload = vec![0u8; remaining - bytes_read];
        buf.read_exact(&mut payload)
            .map_err(|e| Error::MalformedPacket(format!("publish payload: {e}")))?;

        Ok(Self {
            packet_id,
            qos: fixed_header.flags.qos,
            dup: fixed_header.flags.dup,
            retain: fixed_header.flags.retain,
            topic,
            payload,
        })
    }
}
