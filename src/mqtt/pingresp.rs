use crate::error::Result;
use crate::mqtt::{FixedHeader, FixedHeaderFlags, PacketType};

/// PINGRESP carries no payload (fixed header only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRespPacket;

impl PingRespPacket {
    /// Encodes the full packet: a bare fixed header with `remaining=0`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = FixedHeader::new(PacketType::Pingresp, FixedHeaderFlags::default(), 0);
        let mut buf = Vec::new();
        header.write(&mut buf)?;
        Ok(buf)
    }
}
