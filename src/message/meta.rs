//! Message metadata
//!
//! Encoded as the middle frame of every data message:
//!
//! ```text
//! version:1
//! mime_type:str
//! status:1
//! sender:opt-str
//! reply_to:opt-str
//! communication_id:1+8 (presence marker + u64)
//! description:opt-str
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DecodeError;
use crate::wire;

const META_VERSION: u8 = 1;

/// Well-known mime types
pub mod mime {
    /// Opaque bytes
    pub const BYTES: &str = "binary/bytes";
    /// UTF-8 text
    pub const STRING: &str = "text/string";
    /// Big-endian signed 64-bit integer
    pub const INT64: &str = "binary/int64";
}

/// Severity attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Info,
    Warning,
    Error,
}

impl Status {
    fn as_u8(self) -> u8 {
        match self {
            Status::Info => 0,
            Status::Warning => 1,
            Status::Error => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Status::Info),
            1 => Ok(Status::Warning),
            2 => Ok(Status::Error),
            value => Err(DecodeError::InvalidTag {
                field: "status",
                value,
            }),
        }
    }
}

/// Metadata carried alongside the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Payload type tag
    pub mime_type: String,
    pub status: Status,
    /// Name of the publishing actor
    pub sender: Option<String>,
    /// Topic the receiver should publish its response to
    pub reply_to: Option<String>,
    /// Correlates a response with its request
    pub communication_id: Option<u64>,
    pub description: Option<String>,
}

impl Meta {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            status: Status::Info,
            sender: None,
            reply_to: None,
            communication_id: None,
            description: None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.mime_type.len());
        buf.put_u8(META_VERSION);
        wire::put_string(&mut buf, &self.mime_type);
        buf.put_u8(self.status.as_u8());
        wire::put_opt_string(&mut buf, self.sender.as_deref());
        wire::put_opt_string(&mut buf, self.reply_to.as_deref());
        match self.communication_id {
            Some(id) => {
                buf.put_u8(1);
                buf.put_u64(id);
            }
            None => buf.put_u8(0),
        }
        wire::put_opt_string(&mut buf, self.description.as_deref());
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, DecodeError> {
        let version = wire::get_u8(&mut buf)?;
        if version != META_VERSION {
            return Err(DecodeError::InvalidTag {
                field: "meta version",
                value: version,
            });
        }

        let mime_type = wire::get_string(&mut buf)?;
        let status = Status::from_u8(wire::get_u8(&mut buf)?)?;
        let sender = wire::get_opt_string(&mut buf)?;
        let reply_to = wire::get_opt_string(&mut buf)?;
        let communication_id = match wire::get_u8(&mut buf)? {
            0 => None,
            1 => Some(wire::get_u64(&mut buf)?),
            value => {
                return Err(DecodeError::InvalidTag {
                    field: "communication id",
                    value,
                })
            }
        };
        let description = wire::get_opt_string(&mut buf)?;

        Ok(Self {
            mime_type,
            status,
            sender,
            reply_to,
            communication_id,
            description,
        })
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new(mime::BYTES)
    }
}
