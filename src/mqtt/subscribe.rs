use crate::error::{Error, Result};
use crate::mqtt::{protocol, FixedHeader};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTopic {
    pub topic: String,
    pub qos: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscription_topics: Vec<SubscriptionTopic>,
}

impl SubscribePacket {
    pub fn new(packet_id: u16, subscription_topics: Vec<SubscriptionTopic>) -> Self {
        Self {
            packet_id,
            subscription_topics,
        }
    }

    pub fn write_body(&self, buf: &mut impl Write) -> std::io::Result<()> {
        buf.write_u16::<NetworkEndian>(self.packet_id)?;
        for s in &self.subscription_topics {
            protocol::write_string(buf, &s.topic)?;
            buf.write_u8(s.qos)?;
        }
        Ok(())
    }

    /// Reads `msgId` followed by one-or-more `(topic, qos)` entries
    /// filling the fixed header's `remaining` budget.
    pub fn read_body(buf: &mut impl Read, fixed_header: &FixedHeader) -> Result<Self> {
        let packet_id = buf
            .read_u16::<NetworkEndian>()
            .map_err(|e| Error::MalformedPacket(format!("subscribe packet id: {e}")))?;
        let mut consumed = 2usize;
        let remaining = fixed_header.remaining_length as usize;

        let mut subscription_topics = Vec::new();
        while consumed < remaining {
            let topic = protocol::read_string(buf)?;
            let qos = buf
                .read_u8()
                .map_err(|e| Error::MalformedPacket(format!("subscribe qos: {e}")))?;
            consumed += 2 + topic.len() + 1;
            subscription_topics.push(SubscriptionTopic { topic, qos });
        }

        if subscription_topics.is_empty() {
            return Err(Error::MalformedPacket(
                "subscribe with no topic filters".into(),
            ));
        }

        Ok(Self {
            packet_id,
            subscription_topics,
        })
    }
}
