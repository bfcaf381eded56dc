/// DISCONNECT carries no payload (fixed header only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectPacket;
