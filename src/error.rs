//! Error types
//!
//! A single crate-level [`Error`] with two nested families:
//! [`HandshakeError`] for proxy confirmation failures and [`DecodeError`]
//! for malformed wire data.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure
    Io(io::Error),
    /// Host could not be resolved or port is out of range
    InvalidAddress(String),
    /// Malformed canonical topic string
    InvalidTopic(String),
    /// Empty or otherwise unusable actor/registration name
    InvalidName(String),
    /// A response was requested for a message without a reply topic
    MissingReplyTo,
    /// The context refused to create another socket
    SocketLimit { max: usize },
    /// Bind failed because another process owns the port
    AddressInUse(SocketAddr),
    /// Connection or subscription was not confirmed by the proxy
    Handshake(HandshakeError),
    /// Wire data could not be decoded
    Decode(DecodeError),
    /// The registrar answered with an error description
    Registrar(String),
    /// The registrar did not answer in time
    RequestTimeout { address: String, timeout: Duration },
    /// No response arrived for a synchronous publish
    SyncPublishTimeout { topic: String, timeout: Duration },
    /// Operation not supported by the connection role
    WrongRole {
        operation: &'static str,
        role: &'static str,
    },
    /// Socket or context was closed
    Closed,
}

impl Error {
    /// Whether the failure is a timeout the caller may simply retry
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::RequestTimeout { .. } | Error::SyncPublishTimeout { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            Error::InvalidTopic(topic) => write!(f, "Invalid topic: {:?}", topic),
            Error::InvalidName(msg) => write!(f, "Invalid name: {}", msg),
            Error::MissingReplyTo => write!(f, "Message has no reply topic"),
            Error::SocketLimit { max } => {
                write!(f, "Socket limit reached: {} sockets open", max)
            }
            Error::AddressInUse(addr) => write!(f, "Address already in use: {}", addr),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Registrar(msg) => write!(f, "Registrar error: {}", msg),
            Error::RequestTimeout { address, timeout } => write!(
                f,
                "Registrar request to {} timed out after {} ms",
                address,
                timeout.as_millis()
            ),
            Error::SyncPublishTimeout { topic, timeout } => write!(
                f,
                "No response to {} after {} ms",
                topic,
                timeout.as_millis()
            ),
            Error::WrongRole { operation, role } => {
                write!(f, "Operation {} not supported by {} connection", operation, role)
            }
            Error::Closed => write!(f, "Socket closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Handshake(e) => Some(e),
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

/// Proxy confirmation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// CONNECT control frame never came back through the relay
    ConnectionNotConfirmed { address: String, timeout: Duration },
    /// SUBSCRIBE echo never reached the subscriber socket
    SubscriptionNotConfirmed {
        address: String,
        topic: String,
        timeout: Duration,
    },
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::ConnectionNotConfirmed { address, timeout } => write!(
                f,
                "could not confirm connection to {} within {} ms",
                address,
                timeout.as_millis()
            ),
            HandshakeError::SubscriptionNotConfirmed {
                address,
                topic,
                timeout,
            } => write!(
                f,
                "could not confirm subscription to {} on {} within {} ms",
                topic,
                address,
                timeout.as_millis()
            ),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Wire decoding failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ended before the value was complete
    UnexpectedEof,
    /// Packet kind byte is not known
    UnknownPacket(u8),
    /// Socket kind byte is not known
    UnknownSocketKind(u8),
    /// Packet length exceeds the allowed maximum
    PacketTooLarge(usize),
    /// Message carries more frames than the count field holds
    TooManyFrames(usize),
    /// Wrong number of frames for the message layout
    FrameCount { expected: usize, got: usize },
    /// String field is not valid UTF-8
    InvalidUtf8,
    /// Enum tag is out of range
    InvalidTag { field: &'static str, value: u8 },
    /// Opcode frame is not recognized
    UnknownOpcode(String),
    /// Embedded topic failed to parse
    InvalidTopic(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of data"),
            DecodeError::UnknownPacket(kind) => write!(f, "unknown packet kind 0x{:02x}", kind),
            DecodeError::UnknownSocketKind(kind) => {
                write!(f, "unknown socket kind 0x{:02x}", kind)
            }
            DecodeError::PacketTooLarge(len) => write!(f, "packet too large: {} bytes", len),
            DecodeError::TooManyFrames(count) => write!(f, "too many frames: {}", count),
            DecodeError::FrameCount { expected, got } => {
                write!(f, "expected {} frames, got {}", expected, got)
            }
            DecodeError::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            DecodeError::InvalidTag { field, value } => {
                write!(f, "invalid {} tag {}", field, value)
            }
            DecodeError::UnknownOpcode(op) => write!(f, "unknown opcode {:?}", op),
            DecodeError::InvalidTopic(topic) => write!(f, "invalid topic {:?}", topic),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for io::Error {
    fn from(e: DecodeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_distinguishable() {
        let sync = Error::SyncPublishTimeout {
            topic: "t".into(),
            timeout: Duration::from_millis(1000),
        };
        assert!(sync.is_timeout());

        let bind = Error::AddressInUse("127.0.0.1:7771".parse().unwrap());
        assert!(!bind.is_timeout());
        assert!(!Error::InvalidName("".into()).is_timeout());

        let handshake: Error = HandshakeError::ConnectionNotConfirmed {
            address: "10.0.0.1:7771".into(),
            timeout: Duration::from_millis(250),
        }
        .into();
        assert!(!handshake.is_timeout());
        assert!(!Error::MissingReplyTo.is_timeout());
    }

    #[test]
    fn test_display_carries_context() {
        let e: Error = HandshakeError::ConnectionNotConfirmed {
            address: "10.0.0.1:7771".into(),
            timeout: Duration::from_millis(250),
        }
        .into();
        let text = e.to_string();
        assert!(text.contains("10.0.0.1:7771"));
        assert!(text.contains("250 ms"));
    }

    #[test]
    fn test_decode_error_into_io() {
        let io: io::Error = DecodeError::UnexpectedEof.into();
        assert_eq!(io.kind(), io::ErrorKind::InvalidData);
    }
}
