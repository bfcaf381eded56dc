///
/// MQTT CONNECT packet, contains a variable header with some connect
/// related flags:
/// - clean session flag
/// - will flag
/// - will QoS (if will flag set to true)
/// - will topic (if will flag set to true)
/// - will retain flag (if will flag set to true)
/// - password flag
/// - username flag
///
/// It's followed by all required fields according the flags set to true.
///
/// |------------|--------------------------------------------------|
/// | Byte 6     |             Protocol name len MSB                |
/// | Byte 7     |             Protocol name len LSB                |  [UINT16]
/// |------------|--------------------------------------------------|
/// | Byte 8     |                                                  |
/// |   .        |                'M' 'Q' 'T' 'T'                   |
/// | Byte 12    |                                                  |
/// |------------|--------------------------------------------------|
/// | Byte 13    |                 Protocol level                   |
/// |------------|--------------------------------------------------|
/// |            |                 Connect flags                    |
/// | Byte 14    |--------------------------------------------------|
/// |            |  U  |  P  |  WR |     WQ    |  WF |  CS |    R   |
/// |------------|--------------------------------------------------|
/// | Byte 15    |                 Keepalive MSB                    |  [UINT16]
/// | Byte 17    |                 Keepalive LSB                    |
/// |------------|--------------------------------------------------|<-- Payload
/// | Byte 18    |             Client ID length MSB                 |  [UINT16]
/// | Byte 19    |             Client ID length LSB                 |
/// |------------|--------------------------------------------------|
/// | Byte 20    |                                                  |
/// |   .        |                  Client ID                       |
/// | Byte N     |                                                  |
/// |------------|--------------------------------------------------|
/// | Byte N+1   |    Will topic / will message / username /        |
/// |   .        |    password, each length-prefixed, present       |
/// | Byte N+M   |    iff its connect flag bit is set.               |
/// |------------|--------------------------------------------------|
///
use crate::mqtt::protocol;
use crate::error::Result;
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};

const MQTT_V4: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectFlags {
    pub clean_session: bool,
    pub will: bool,
    pub will_qos: u8,
    pub will_retain: bool,
    pub password: bool,
    pub username: bool,
}

impl fmt::Display for ConnectFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "clean session:{} will:{} will_qos:{} will_retain: {} username: {} password: {}",
            self.clean_session,
            self.will,
            self.will_qos,
            self.will_retain,
            self.username,
            self.password
        )
    }
}

impl ConnectFlags {
    pub fn new(clean_session: bool) -> ConnectFlags {
        ConnectFlags {
            clean_session,
            will: false,
            will_qos: 0,
            will_retain: false,
            password: false,
            username: false,
        }
    }

    pub fn write(&self, buf: &mut impl Write) -> io::Result<()> {
        let mut connect_flags = 0;
        if self.clean_session {
            connect_flags |= 0x02;
        }
        if self.will {
            connect_flags |= 0x04;
        }
        if self.will_retain {
            connect_flags |= 0x20;
        }
        connect_flags |= (self.will_qos & 0x03) << 3;
        if self.password {
            connect_flags |= 0x40;
        }
        if self.username {
            connect_flags |= 0x80;
        }
        buf.write_u8(connect_flags)
    }

    pub fn from_byte(byte: u8) -> ConnectFlags {
        ConnectFlags {
            clean_session: byte & 0x02 != 0,
            will: byte & 0x04 != 0,
            will_qos: (byte >> 3) & 0x03,
            will_retain: byte & 0x20 != 0,
            password: byte & 0x40 != 0,
            username: byte & 0x80 != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectVariableHeader {
    pub flags: ConnectFlags,
    pub keepalive: u16,
}

impl fmt::Display for ConnectVariableHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} keepalive:{}", self.flags, self.keepalive)
    }
}

impl ConnectVariableHeader {
    pub fn new(clean_session: bool, keepalive: u16) -> ConnectVariableHeader {
        ConnectVariableHeader {
            flags: ConnectFlags::new(clean_session),
            keepalive,
        }
    }

    pub fn write(&self, buf: &mut impl Write) -> io::Result<()> {
        self.flags.write(buf)?;
        buf.write_u16::<NetworkEndian>(self.keepalive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectPayload {
    pub client_id: String,
    pub will_topic: Option<String>,
    pub will_message: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Display for ConnectPayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.client_id,
            self.will_topic.as_deref().unwrap_or(""),
            self.will_message.as_deref().unwrap_or(""),
            self.username.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or("")
        )
    }
}

impl ConnectPayload {
    pub fn new(client_id: String) -> ConnectPayload {
        ConnectPayload {
            client_id,
            will_topic: None,
            will_message: None,
            username: None,
            password: None,
        }
    }

    pub fn write(&self, buf: &mut impl Write) -> io::Result<()> {
        protocol::write_string(buf, &self.client_id)?;
        if let Some(will_topic) = &self.will_topic {
            protocol::write_string(buf, will_topic)?;
        }
        if let Some(will_message) = &self.will_message {
            protocol::write_string(buf, will_message)?;
        }
        if let Some(username) = &self.username {
            protocol::write_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            protocol::write_string(buf, password)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub variable_header: ConnectVariableHeader,
    pub payload: ConnectPayload,
}

impl ConnectPacket {
    pub fn new(client_id: String, clean_session: bool) -> Self {
        Self {
            variable_header: ConnectVariableHeader::new(clean_session, 60),
            payload: ConnectPayload::new(client_id),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.payload.client_id
    }

    pub fn keep_alive(&self) -> u16 {
        self.variable_header.keepalive
    }

    pub fn write(&self, buf: &mut impl Write) -> io::Result<()> {
        protocol::write_string(buf, "MQTT")?;
        buf.write_u8(MQTT_V4)?;
        self.variable_header.write(buf)?;
        self.payload.write(buf)
    }

    /// Decodes the variable header and payload following the fixed
    /// header. The protocol name/version are consumed but not
    /// otherwise validated here; rejecting a bad version is the
    /// broker's job (it replies CONNACK(BAD_VERSION)).
    pub fn read_body(buf: &mut impl Read) -> Result<Self> {
        let _protocol_name = protocol::read_string(buf)?;
        let mut version = [0u8; 1];
        buf.read_exact(&mut version)
            .map_err(|e| crate::error::Error::MalformedPacket(format!("protocol level: {e}")))?;

        let flags_byte = buf
            .read_u8()
            .map_err(|e| crate::error::Error::MalformedPacket(format!("connect flags: {e}")))?;
        let flags = ConnectFlags::from_byte(flags_byte);
        let keepalive = buf
            .read_u16::<NetworkEndian>()
            .map_err(|e| crate::error::Error::MalformedPacket(format!("keep alive: {e}")))?;
        let client_id = protocol::read_string(buf)?;

        let mut payload = ConnectPayload::new(client_id);
        if flags.will {
            payload.will_topic = Some(protocol::read_string(buf)?);
            payload.will_message = Some(protocol::read_string(buf)?);
        }
        if flags.username {
            payload.username = Some(protocol::read_string(buf)?);
        }
        if flags.password {
            payload.password = Some(protocol::read_string(buf)?);
        }

        Ok(Self {
            variable_header: ConnectVariableHeader {
                flags,
                keepalive,
            },
            payload,
        })
    }
}
