use thiserror::Error;

/// Failure modes of the codec, framing stream and broker.
///
/// `MalformedPacket` and `ProtocolViolation` are fatal to the connection
/// they occur on (the client cannot be trusted to parse a response);
/// `BadTopicFilter` is reported per-entry in a SUBACK instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("stream buffer overflow")]
    Overflow,

    #[error("bad topic filter: {0}")]
    BadTopicFilter(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("transport closed")]
    TransportClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
