use crate::error::{Error, Result};
use crate::mqtt::{protocol, FixedHeader};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

impl UnsubscribePacket {
    pub fn new(packet_id: u16, topics: Vec<String>) -> Self {
        Self { packet_id, topics }
    }

    pub fn write_body(&self, buf: &mut impl Write) -> std::io::Result<()> {
        buf.write_u16::<NetworkEndian>(self.packet_id)?;
        for topic in &self.topics {
            protocol::write_string(buf, topic)?;
        }
        Ok(())
    }

    pub fn read_body(buf: &mut impl Read, fixed_header: &FixedHeader) -> Result<Self> {
        let packet_id = buf
            .read_u16::<NetworkEndian>()
            .map_err(|e| Error::MalformedPacket(format!("unsubscribe packet id: {e}")))?;
        let mut consumed = 2usize;
        let remaining = fixed_header.remaining_length as usize;

        let mut topics = Vec::new();
        while consumed < remaining {
            let topic = protocol::read_string(buf)?;
            consumed += 2 + topic.len();
            topics.push(topic);
        }

        if topics.is_empty() {
            return Err(Error::MalformedPacket(
                "unsubscribe with no topic filters".into(),
            ));
        }

        Ok(Self { packet_id, topics })
    }
}
