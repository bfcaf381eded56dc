use crate::error::Result;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};

/// Return code in CONNACK, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    BadVersion = 1,
    BadId = 2,
    ServerUnavailable = 3,
    BadUserOrPwd = 4,
    NotAuthorized = 5,
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectReturnCode::Accepted => write!(f, "Accepted"),
            ConnectReturnCode::BadVersion => write!(f, "Unacceptable Protocol Version"),
            ConnectReturnCode::BadId => write!(f, "Identifier Rejected"),
            ConnectReturnCode::ServerUnavailable => write!(f, "Server Unavailable"),
            ConnectReturnCode::BadUserOrPwd => write!(f, "Bad Username or Password"),
            ConnectReturnCode::NotAuthorized => write!(f, "Not Authorized"),
        }
    }
}

impl ConnectReturnCode {
    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => ConnectReturnCode::BadVersion,
            2 => ConnectReturnCode::BadId,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadUserOrPwd,
            5 => ConnectReturnCode::NotAuthorized,
            _ => ConnectReturnCode::Accepted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnackPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl fmt::Display for ConnackPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CONNACK: {} Session present: {}",
            self.return_code, self.session_present
        )
    }
}

impl ConnackPacket {
    pub fn new(return_code: ConnectReturnCode) -> Self {
        Self {
            session_present: false,
            return_code,
        }
    }

    pub fn write(&self, buf: &mut impl Write) -> io::Result<()> {
        buf.write_u8(self.session_present as u8)?;
        buf.write_u8(self.return_code as u8)
    }

    /// Encodes the full packet (fixed header + body), ready to send.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = crate::mqtt::FixedHeader::new(
            crate::mqtt::PacketType::Connack,
            crate::mqtt::FixedHeaderFlags::default(),
            Self::REMAINING_LENGTH,
        );
        let mut buf = Vec::new();
        header.write(&mut buf)?;
        self.write(&mut buf)?;
        Ok(buf)
    }

    pub fn read_body(buf: &mut impl Read) -> Result<Self> {
        let session_present = buf
            .read_u8()
            .map_err(|e| crate::error::Error::MalformedPacket(format!("connack: {e}")))?
            != 0;
        let return_code = ConnectReturnCode::from_byte(
            buf.read_u8()
                .map_err(|e| crate::error::Error::MalformedPacket(format!("connack: {e}")))?,
        );
        Ok(ConnackPacket {
            session_present,
            return_code,
        })
    }

    /// `FixedHeader.remaining` is always 2 for CONNACK (spec.md §3).
    pub const REMAINING_LENGTH: u32 = 2;
}
