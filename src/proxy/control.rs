//! Control frames for the connect/subscribe confirmation handshake
//!
//! ```text
//! client  ──[CTRL_TOPIC, "pub", identity]──► relay ──► controller
//! controller ──["pub", identity]──► router ──► client dealer
//!
//! client  ──[CTRL_TOPIC, "sub", topic]──► relay ──► controller
//! controller ──[topic, "sub"]──► relay ──► client subscriber
//! ```
//!
//! Control frames never reach application callbacks: the dispatch loop
//! drops the two-frame subscribe echo and any request on [`CTRL_TOPIC`].

use std::fmt;

use bytes::Bytes;

use crate::error::DecodeError;
use crate::wire;

/// First frame of every control request
pub const CTRL_TOPIC: &str = "actorbus:control";

/// Confirms the publish path
pub const CTRL_CONNECT: &str = "pub";

/// Confirms a subscription
pub const CTRL_SUBSCRIBE: &str = "sub";

/// Round-trip probe of the relay
pub const CTRL_REPLY: &str = "rep";

/// Handshake request kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Connect,
    Subscribe,
    Reply,
}

impl ControlType {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlType::Connect => CTRL_CONNECT,
            ControlType::Subscribe => CTRL_SUBSCRIBE,
            ControlType::Reply => CTRL_REPLY,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            CTRL_CONNECT => Some(ControlType::Connect),
            CTRL_SUBSCRIBE => Some(ControlType::Subscribe),
            CTRL_REPLY => Some(ControlType::Reply),
            _ => None,
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[CTRL_TOPIC, type, id]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub kind: ControlType,
    /// Dealer identity for connect/reply, topic for subscribe
    pub id: String,
}

impl ControlFrame {
    pub fn new(kind: ControlType, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn to_frames(&self) -> Vec<Bytes> {
        vec![
            Bytes::from_static(CTRL_TOPIC.as_bytes()),
            Bytes::from_static(self.kind.as_str().as_bytes()),
            Bytes::copy_from_slice(self.id.as_bytes()),
        ]
    }

    pub fn from_frames(frames: &[Bytes]) -> Result<Self, DecodeError> {
        let [topic, kind, id] = frames else {
            return Err(DecodeError::FrameCount {
                expected: 3,
                got: frames.len(),
            });
        };
        if &topic[..] != CTRL_TOPIC.as_bytes() {
            return Err(DecodeError::InvalidTopic(
                String::from_utf8_lossy(topic).into_owned(),
            ));
        }
        let kind = wire::frame_str(kind)?;
        let kind = ControlType::parse(kind)
            .ok_or_else(|| DecodeError::UnknownOpcode(kind.to_string()))?;

        Ok(Self {
            kind,
            id: wire::frame_str(id)?.to_string(),
        })
    }
}

/// Reply routed back to a dealer: `[type, id]`
pub(crate) fn routed_reply(kind: ControlType, id: &str) -> Vec<Bytes> {
    vec![
        Bytes::from_static(kind.as_str().as_bytes()),
        Bytes::copy_from_slice(id.as_bytes()),
    ]
}

/// Whether `frames` is the routed reply for `kind` and `id`
pub(crate) fn is_routed_reply(frames: &[Bytes], kind: ControlType, id: &str) -> bool {
    matches!(frames, [k, i] if &k[..] == kind.as_str().as_bytes() && &i[..] == id.as_bytes())
}

/// Subscribe echo published through the relay: `[topic, "sub"]`
pub(crate) fn subscribe_echo(topic: &str) -> Vec<Bytes> {
    vec![
        Bytes::copy_from_slice(topic.as_bytes()),
        Bytes::from_static(CTRL_SUBSCRIBE.as_bytes()),
    ]
}

/// Whether `frames` is the subscribe echo for `topic`
pub(crate) fn is_subscribe_echo(frames: &[Bytes], topic: &str) -> bool {
    matches!(frames, [t, k] if &t[..] == topic.as_bytes() && &k[..] == CTRL_SUBSCRIBE.as_bytes())
}

/// Two-frame messages are control echoes, never application data
pub fn is_control_echo(frames: &[Bytes]) -> bool {
    frames.len() == 2
}

/// Echoes and control requests. Subscribers to every domain see both.
pub fn is_control(frames: &[Bytes]) -> bool {
    is_control_echo(frames) || frames.first().is_some_and(|t| &t[..] == CTRL_TOPIC.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frame_layout() {
        let frame = ControlFrame::new(ControlType::Subscribe, "d:s:t");
        let frames = frame.to_frames();
        assert_eq!(&frames[0][..], CTRL_TOPIC.as_bytes());
        assert_eq!(&frames[1][..], b"sub");
        assert_eq!(ControlFrame::from_frames(&frames).unwrap(), frame);
    }

    #[test]
    fn test_rejects_data_messages() {
        let frames = vec![
            Bytes::from_static(b"d:s:t"),
            Bytes::from_static(b"meta"),
            Bytes::from_static(b"data"),
        ];
        assert!(ControlFrame::from_frames(&frames).is_err());

        let frames = vec![
            Bytes::from_static(CTRL_TOPIC.as_bytes()),
            Bytes::from_static(b"nope"),
            Bytes::from_static(b"x"),
        ];
        assert_eq!(
            ControlFrame::from_frames(&frames),
            Err(DecodeError::UnknownOpcode("nope".into()))
        );
    }

    #[test]
    fn test_echo_recognition() {
        let echo = subscribe_echo("d:s");
        assert!(is_control_echo(&echo));
        assert!(is_subscribe_echo(&echo, "d:s"));
        assert!(!is_subscribe_echo(&echo, "d:s:t"));

        let reply = routed_reply(ControlType::Connect, "abc");
        assert!(is_routed_reply(&reply, ControlType::Connect, "abc"));
        assert!(!is_routed_reply(&reply, ControlType::Reply, "abc"));
    }

    #[test]
    fn test_control_requests_are_control() {
        let request = ControlFrame::new(ControlType::Connect, "abc").to_frames();
        assert!(!is_control_echo(&request));
        assert!(is_control(&request));
        assert!(is_control(&subscribe_echo("d")));

        let data = vec![Bytes::from_static(b"d"), Bytes::new(), Bytes::new()];
        assert!(!is_control(&data));
    }
}
