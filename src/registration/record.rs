//! Registration records
//!
//! A record says "actor `name` on `host:port` publishes (or subscribes to)
//! `topic`". Two records are the same registration when name, host and
//! topic agree; port and description are payload.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, Error, Result};
use crate::topic::Topic;
use crate::wire;

/// Which side of the pub/sub relationship a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerType {
    Publisher,
    Subscriber,
}

impl OwnerType {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            OwnerType::Publisher => 1,
            OwnerType::Subscriber => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> std::result::Result<Self, DecodeError> {
        match value {
            1 => Ok(OwnerType::Publisher),
            2 => Ok(OwnerType::Subscriber),
            value => Err(DecodeError::InvalidTag {
                field: "owner type",
                value,
            }),
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerType::Publisher => f.write_str("publisher"),
            OwnerType::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// One registration
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    name: String,
    owner: OwnerType,
    host: String,
    port: u16,
    topic: Topic,
    description: String,
}

impl RegistrationRecord {
    /// Build a record; `name` and `host` must be non-empty
    pub fn new(
        name: impl Into<String>,
        owner: OwnerType,
        host: impl Into<String>,
        port: u16,
        topic: Topic,
        description: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let host = host.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidName("registration name is empty".into()));
        }
        if host.is_empty() {
            return Err(Error::InvalidAddress("registration host is empty".into()));
        }
        Ok(Self {
            name,
            owner,
            host,
            port,
            topic,
            description: description.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> OwnerType {
        self.owner
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        wire::put_string(buf, &self.name);
        buf.put_u8(self.owner.as_u8());
        wire::put_string(buf, &self.host);
        buf.put_u16(self.port);
        wire::put_string(buf, &self.topic.to_string());
        wire::put_string(buf, &self.description);
    }

    pub(crate) fn decode_from(buf: &mut Bytes) -> std::result::Result<Self, DecodeError> {
        let name = wire::get_string(buf)?;
        let owner = OwnerType::from_u8(wire::get_u8(buf)?)?;
        let host = wire::get_string(buf)?;
        let port = wire::get_u16(buf)?;
        let topic_str = wire::get_string(buf)?;
        let topic = Topic::wrap(&topic_str).map_err(|_| DecodeError::InvalidTopic(topic_str))?;
        let description = wire::get_string(buf)?;

        Ok(Self {
            name,
            owner,
            host,
            port,
            topic,
            description,
        })
    }
}

impl PartialEq for RegistrationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.host == other.host && self.topic == other.topic
    }
}

impl Eq for RegistrationRecord {}

impl Hash for RegistrationRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.host.hash(state);
        self.topic.hash(state);
    }
}

impl fmt::Display for RegistrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}@{}:{}",
            self.owner, self.name, self.topic, self.host, self.port
        )
    }
}
